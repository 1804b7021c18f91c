use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use prost::Message;
use rustls_pemfile::{certs, private_key};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::{rustls, TlsAcceptor};

use flowstate_metrics::CounterRegistry;
use flowstate_session::{Session, SessionTable};
use flowstate_wire::{AuthClaims, Idp, IdpRegistry, LoginSuccessPayload, ResponseCode};

use crate::config::ServerConfig;
use crate::error::AuthError;

const READ_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const TOKEN_SCRATCH_LEN: usize = 1500;
/// Bound on connections waiting between the acceptor and the handler pool;
/// beyond this, new TLS connections back up at the OS accept queue rather
/// than growing unbounded in-process state.
const ACCEPT_QUEUE_DEPTH: usize = 1024;

fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig> {
    let cert_bytes =
        std::fs::read(cert_path).with_context(|| format!("reading {}", cert_path.display()))?;
    let key_bytes =
        std::fs::read(key_path).with_context(|| format!("reading {}", key_path.display()))?;

    let cert_chain = certs(&mut cert_bytes.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .context("parsing TLS certificate chain")?;
    let key = private_key(&mut key_bytes.as_slice())
        .context("parsing TLS private key")?
        .context("no private key found in key file")?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("building TLS server config")
}

/// Shared, read-only state every auth handler task needs.
pub struct AuthContext {
    pub session_table: Arc<SessionTable>,
    pub idp_registry: Arc<IdpRegistry>,
    pub counters: Arc<CounterRegistry>,
    pub jwt_secret: [u8; 32],
}

/// Binds the TLS listener and runs the acceptor + handler-pool loop until
/// `shutdown` fires. Bind and TLS key-load failures are the only
/// fatal-to-process conditions this plane can raise.
pub async fn run(
    config: Arc<ServerConfig>,
    ctx: Arc<AuthContext>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    let tls_config = load_tls_config(&config.cert_path, &config.key_path)?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));
    let listener = TcpListener::bind(("0.0.0.0", config.auth_port))
        .await
        .with_context(|| format!("binding auth listener on port {}", config.auth_port))?;

    let (tx, rx) = mpsc::channel::<TcpStream>(ACCEPT_QUEUE_DEPTH);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = Vec::with_capacity(config.auth_workers);
    for _ in 0..config.auth_workers {
        let rx = rx.clone();
        let acceptor = acceptor.clone();
        let ctx = ctx.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let stream = { rx.lock().await.recv().await };
                let Some(stream) = stream else { break };
                let acceptor = acceptor.clone();
                let ctx = ctx.clone();
                handle_connection(stream, acceptor, ctx).await;
            }
        }));
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        if tx.try_send(stream).is_err() {
                            log::warn!("auth accept queue full, dropping connection");
                        }
                    }
                    Err(e) => log::warn!("auth accept failed: {e}"),
                }
            }
            _ = &mut shutdown => {
                log::info!("auth listener shutting down");
                drop(tx);
                break;
            }
        }
    }

    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn handle_connection(stream: TcpStream, acceptor: TlsAcceptor, ctx: Arc<AuthContext>) {
    let mut tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            log::warn!("TLS handshake failed: {e}");
            return;
        }
    };

    match process_login(&mut tls, &ctx).await {
        Ok(()) => {
            ctx.counters.increment("auth_login_success");
        }
        Err(err) => {
            ctx.counters.increment("auth_login_failed");
            if let Some(code) = err.response_code() {
                let frame = [1u8, code.as_u8()];
                let _ = tokio::time::timeout(WRITE_TIMEOUT, tls.write_all(&frame)).await;
            }
            log::warn!("auth handshake failed: {err}");
        }
    }
    let _ = tls.shutdown().await;
}

/// The handshake logic (`spec.md` §4.5 steps 2-7), generic over the
/// transport so it can run over a real `TlsStream` in production and a
/// plain in-memory duplex in tests — TLS only wraps the bytes, it has no
/// bearing on token/idp/conflict/session-mint behavior.
async fn process_login<S>(stream: &mut S, ctx: &AuthContext) -> Result<(), AuthError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut scratch = vec![0u8; TOKEN_SCRATCH_LEN];
    let n = tokio::time::timeout(READ_TIMEOUT, stream.read(&mut scratch))
        .await
        .map_err(|_| AuthError::LoginTimeout)?
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    let token = std::str::from_utf8(&scratch[..n])
        .map_err(|e| AuthError::Internal(format!("token is not valid UTF-8: {e}")))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = decode::<AuthClaims>(
        token,
        &DecodingKey::from_secret(&ctx.jwt_secret),
        &validation,
    )
    .map_err(AuthError::InvalidToken)?
    .claims;

    let idp = Idp::from_str(&claims.idp).map_err(|_| AuthError::InvalidServer)?;
    if !ctx.idp_registry.verify(idp, &claims.app_id) {
        return Err(AuthError::InvalidServer);
    }

    if ctx.session_table.get_from_uid(claims.uid).is_some() {
        return Err(AuthError::LoginConflict);
    }

    let session = ctx
        .session_table
        .new_session(claims.uid, |sidx, uid| Session::generate(sidx, uid, 1).ok())
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    let payload = LoginSuccessPayload::new(session.sidx(), *session.shared_key());
    let mut frame = vec![1u8, ResponseCode::LoginSuccess.as_u8()];
    payload.encode(&mut frame).expect("encoding to a Vec never fails");

    tokio::time::timeout(WRITE_TIMEOUT, stream.write_all(&frame))
        .await
        .map_err(|_| AuthError::Internal("timed out writing login response".into()))?
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    Ok(())
}
