use std::time::Instant;

use flowstate_intrusive_list::{IntrusiveList, NodeIndex};

use crate::config::MatchmakerConfig;
use crate::lobby::Lobby;
use crate::match_config::{MatchConfig, PlayerConfig, Team};

/// All index-subsets of `sizes` (0-based positions) whose values sum to
/// exactly `target`. Backtracking subset-sum: at each position either take
/// it (pruning once the running sum would exceed `target`) or skip it.
/// Enumeration order is smallest-index-first, matching the "prefer older
/// lobbies" fairness rule `find_match` relies on downstream.
fn enumerate_subsets_summing_to(sizes: &[usize], target: usize) -> Vec<Vec<usize>> {
    let mut results = Vec::new();
    let mut chosen = Vec::new();
    backtrack(sizes, target, 0, 0, &mut chosen, &mut results);
    results
}

fn backtrack(
    sizes: &[usize],
    target: usize,
    pos: usize,
    sum: usize,
    chosen: &mut Vec<usize>,
    results: &mut Vec<Vec<usize>>,
) {
    if sum == target {
        results.push(chosen.clone());
        return;
    }
    if pos >= sizes.len() {
        return;
    }
    if sum + sizes[pos] <= target {
        chosen.push(pos);
        backtrack(sizes, target, pos + 1, sum + sizes[pos], chosen, results);
        chosen.pop();
    }
    backtrack(sizes, target, pos + 1, sum, chosen, results);
}

fn is_disjoint(a: &[usize], b: &[usize]) -> bool {
    !a.iter().any(|pos| b.contains(pos))
}

/// The earliest `(i, j)` with `i < j` such that `candidates[i]` and
/// `candidates[j]` share no position, scanning `i` outermost so
/// older-enqueued lobbies (which sort earlier by construction) are
/// preferred.
fn find_disjoint_pair(candidates: &[Vec<usize>]) -> Option<(usize, usize)> {
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            if is_disjoint(&candidates[i], &candidates[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn build_match_config(
    r: &[(NodeIndex, Lobby)],
    sun_positions: &[usize],
    moon_positions: &[usize],
    mode: u8,
    match_id: u32,
) -> MatchConfig {
    let mut player_configs = Vec::with_capacity(10);
    for &pos in sun_positions {
        for sidx in r[pos].1.sidxs() {
            player_configs.push(PlayerConfig { sidx, team: Team::Sun });
        }
    }
    for &pos in moon_positions {
        for sidx in r[pos].1.sidxs() {
            player_configs.push(PlayerConfig {
                sidx,
                team: Team::Moon,
            });
        }
    }
    MatchConfig {
        mode,
        id: match_id,
        sun_side_skin_id: 0,
        moon_side_skin_id: 0,
        player_configs,
        begin: Instant::now(),
        end: None,
    }
}

/// Runs one full `find_match` pass over `queue`: borrows lobbies in
/// `borrow_stride`-sized batches, greedily emits every disjoint 5-vs-5
/// pairing it can find, and returns whatever it couldn't match to the
/// queue before returning. `next_match_id` is incremented once per match
/// emitted.
pub fn find_match(
    queue: &IntrusiveList<Lobby>,
    config: &MatchmakerConfig,
    next_match_id: &mut u32,
) -> Vec<MatchConfig> {
    let mut r: Vec<(NodeIndex, Lobby)> = Vec::new();
    let mut matches = Vec::new();

    loop {
        let mut borrowed = Vec::new();
        let got = queue.borrow(config.borrow_stride, &mut borrowed);
        r.extend(borrowed);
        if got == 0 {
            break;
        }

        loop {
            let sizes: Vec<usize> = r.iter().map(|(_, lobby)| lobby.player_count()).collect();
            let candidates = enumerate_subsets_summing_to(&sizes, config.player_per_team);
            let Some((ci, cj)) = find_disjoint_pair(&candidates) else {
                break;
            };

            let mode = r.first().map(|(_, lobby)| lobby.mode).unwrap_or(0);
            let match_config = build_match_config(&r, &candidates[ci], &candidates[cj], mode, *next_match_id);
            *next_match_id += 1;
            matches.push(match_config);

            let mut taken_positions: Vec<usize> = candidates[ci]
                .iter()
                .chain(candidates[cj].iter())
                .copied()
                .collect();
            taken_positions.sort_unstable();

            let taken_indices: Vec<NodeIndex> =
                taken_positions.iter().map(|&pos| r[pos].0).collect();
            queue.take_many(&taken_indices);

            for &pos in taken_positions.iter().rev() {
                r.remove(pos);
            }

            if r.len() < config.min_continue_without_reborrow() {
                break;
            }
        }
    }

    if !r.is_empty() {
        let indices: Vec<NodeIndex> = r.iter().map(|(idx, _)| *idx).collect();
        let (head, tail) = queue.relink(&indices);
        queue.return_chain(head, tail, indices.len());
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::Lobby;

    fn lobby_of_size(idx: u32, size: usize) -> Lobby {
        let mut lobby = Lobby::new(idx, 0, idx * 10);
        for g in 1..size {
            lobby.guests.push(crate::lobby::LobbyGuest {
                sidx: idx * 10 + g as u32,
                invited_by_sidx: idx * 10,
                ready: true,
            });
        }
        lobby
    }

    #[test]
    fn s5_unique_pairing_matches_first_four_lobbies() {
        // Canonical test from spec.md S5: [2,3,2,3,5].
        let queue = IntrusiveList::new();
        let sizes = [2, 3, 2, 3, 5];
        for (idx, &size) in sizes.iter().enumerate() {
            queue.insert(lobby_of_size(idx as u32, size));
        }
        let config = MatchmakerConfig::default();
        let mut next_id = 0;
        let matches = find_match(&queue, &config, &mut next_id);

        assert_eq!(matches.len(), 1);
        let matched_idxs: std::collections::HashSet<u32> = matches[0]
            .player_configs
            .iter()
            .map(|p| p.sidx / 10)
            .collect();
        assert_eq!(
            matched_idxs,
            std::collections::HashSet::from([0, 1, 2, 3])
        );

        // lobby at original index 4 remains queued.
        assert_eq!(queue.len(), 1);
        let mut remaining = Vec::new();
        queue.borrow(10, &mut remaining);
        assert_eq!(remaining[0].1.idx, 4);
    }

    #[test]
    fn s6_no_match_returns_everything_unchanged() {
        let queue = IntrusiveList::new();
        for idx in 0..3 {
            queue.insert(lobby_of_size(idx, 1));
        }
        let config = MatchmakerConfig::default();
        let mut next_id = 0;
        let matches = find_match(&queue, &config, &mut next_id);

        assert!(matches.is_empty());
        assert_eq!(queue.len(), 3);
        let mut remaining = Vec::new();
        queue.borrow(10, &mut remaining);
        assert_eq!(
            remaining.iter().map(|(_, l)| l.idx).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn each_side_sums_to_player_per_team() {
        let queue = IntrusiveList::new();
        for &size in &[5, 5] {
            queue.insert(lobby_of_size(queue.len() as u32, size));
        }
        let config = MatchmakerConfig::default();
        let mut next_id = 0;
        let matches = find_match(&queue, &config, &mut next_id);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].sun_side().count(), 5);
        assert_eq!(matches[0].moon_side().count(), 5);
    }

    #[test]
    fn match_ids_increment_across_multiple_matches() {
        let queue = IntrusiveList::new();
        // Three independent 5v5 pairs in one queue: after the first two
        // matches are emitted, 2 lobbies remain, below the
        // min-continue-without-reborrow threshold, so they go back to the
        // queue rather than forming a third match in this pass.
        for size in [5, 5, 5, 5, 5, 5] {
            queue.insert(lobby_of_size(queue.len() as u32, size));
        }
        let config = MatchmakerConfig::default();
        let mut next_id = 0;
        let matches = find_match(&queue, &config, &mut next_id);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, 0);
        assert_eq!(matches[1].id, 1);
        assert_eq!(next_id, 2);
        assert_eq!(queue.len(), 2);
    }
}
