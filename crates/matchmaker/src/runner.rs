use std::sync::Arc;

use flowstate_intrusive_list::IntrusiveList;

use crate::config::MatchmakerConfig;
use crate::find_match::find_match;
use crate::lobby::Lobby;
use crate::match_config::MatchConfig;

/// Runs `find_match` in a loop, sleeping `config.wait_time(queue.len())`
/// between passes, until `shutdown` fires. Every emitted match is passed
/// to `on_match`.
pub async fn run(
    queue: Arc<IntrusiveList<Lobby>>,
    config: MatchmakerConfig,
    mut on_match: impl FnMut(MatchConfig),
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut next_match_id: u32 = 0;
    loop {
        let matches = find_match(&queue, &config, &mut next_match_id);
        for m in matches {
            log::info!("matchmaker emitted match {}", m.id);
            on_match(m);
        }
        let wait = config.wait_time(queue.len());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                log::info!("matchmaker loop shutting down");
                return;
            }
        }
    }
}
