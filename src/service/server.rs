//! Server thread loops.
//!
//! One acceptor thread takes connections off the Unix socket and spawns a
//! handler thread per client. Handlers speak request/response until a
//! `subscribe` upgrades the connection: from then on a writer thread drains
//! the topic queue to the socket while the handler keeps reading client
//! case messages. Mutations serialize on the per-case write lock inside the
//! service; there is no global state thread to bottleneck on.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::DaemonInfo;
use crate::config::Config;
use crate::core::{Role, Token};
use crate::error::Error;

use super::ipc::{
    IpcError, Request, Response, ResponsePayload, decode_request, encode_message, encode_response,
};
use super::ops::{ErrorPayload, OpError};
use super::state::{Principal, Service};

pub const PROTOCOL_VERSION: u32 = 1;

/// Bind the socket and serve until a shutdown request arrives.
pub fn run_daemon(config: Config) -> Result<(), Error> {
    let socket = config.socket_path();
    if let Some(dir) = socket.parent() {
        std::fs::create_dir_all(dir).map_err(IpcError::Io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
        }
    }
    // A previous daemon may have left its socket behind.
    let _ = std::fs::remove_file(&socket);

    let db_path = config.db_path();
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir).map_err(IpcError::Io)?;
    }
    let service = Service::open(&db_path, config.limits.hub_limits())?;
    let listener = UnixListener::bind(&socket).map_err(IpcError::Io)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    let shutdown = Arc::new(AtomicBool::new(false));

    for stream in listener.incoming() {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match stream {
            Ok(stream) => {
                let service = service.clone();
                let config = config.clone();
                let shutdown = Arc::clone(&shutdown);
                let socket = socket.clone();
                // Handlers are detached; they die with their connection.
                std::thread::spawn(move || {
                    handle_client(stream, service, config, shutdown, socket);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }

    let _ = std::fs::remove_file(&socket);
    tracing::info!("daemon stopped");
    Ok(())
}

fn handle_client(
    stream: UnixStream,
    service: Service,
    config: Config,
    shutdown: Arc<AtomicBool>,
    socket: std::path::PathBuf,
) {
    let mut reader = match stream.try_clone() {
        Ok(r) => BufReader::new(r),
        Err(e) => {
            tracing::warn!(error = %e, "failed to clone stream");
            return;
        }
    };
    let mut writer = stream;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break, // client disconnected
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }

        let request = match decode_request(&line) {
            Ok(r) => r,
            Err(e) => {
                if write_response(&mut writer, &Response::err(ErrorPayload::parse_error(
                    e.to_string(),
                )))
                .is_err()
                {
                    break;
                }
                continue;
            }
        };

        tracing::debug!(op = request.op_name(), "request");

        match request {
            Request::Subscribe {
                token,
                case_id,
                channel_key,
                origin,
            } => {
                // The connection becomes a realtime channel; this handler
                // does not return to request/response mode. The buffered
                // reader moves with it so no pipelined bytes are lost.
                run_channel(
                    reader,
                    &mut writer,
                    &service,
                    &config,
                    &token,
                    case_id,
                    channel_key,
                    origin,
                );
                return;
            }
            Request::Shutdown => {
                let _ = write_response(
                    &mut writer,
                    &Response::ok(ResponsePayload::ShuttingDown { shutting_down: true }),
                );
                shutdown.store(true, Ordering::Release);
                // Poke the acceptor out of its blocking accept.
                let _ = UnixStream::connect(&socket);
                return;
            }
            other => {
                let response = dispatch(&service, other);
                if write_response(&mut writer, &response).is_err() {
                    break;
                }
            }
        }
    }
}

fn write_response(writer: &mut UnixStream, response: &Response) -> Result<(), IpcError> {
    let bytes = encode_response(response).unwrap_or_else(|e| {
        let msg = e.to_string().replace('"', "\\\"");
        format!(r#"{{"err":{{"code":"internal","message":"{msg}"}}}}{}"#, "\n").into_bytes()
    });
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Request dispatch
// =============================================================================

fn dispatch(service: &Service, request: Request) -> Response {
    match try_dispatch(service, request) {
        Ok(payload) => Response::ok(payload),
        Err(e) => Response::err(e),
    }
}

fn try_dispatch(service: &Service, request: Request) -> Result<ResponsePayload, OpError> {
    match request {
        Request::Ping => Ok(ResponsePayload::Pong { pong: true }),
        Request::Info => Ok(ResponsePayload::Info(DaemonInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
            pid: std::process::id(),
        })),
        // Handled by the connection loop.
        Request::Shutdown | Request::Subscribe { .. } => Ok(ResponsePayload::Done { done: true }),

        Request::RegisterUser { username, email } => Ok(ResponsePayload::User(
            service.register_user(&username, &email)?,
        )),
        Request::CreateGroup { token, name } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Group(
                service.create_group(&principal, &name)?,
            ))
        }

        Request::ListCases { token, filter } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Cases(
                service.list_cases(&principal, filter)?,
            ))
        }
        Request::CreateCase {
            token,
            name,
            description,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Case(Box::new(
                service.create_case(&principal, &name, &description)?,
            )))
        }
        Request::GetCase { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Case(Box::new(
                service.get_case(&principal, case_id)?,
            )))
        }
        Request::UpdateCase {
            token,
            case_id,
            patch,
            version,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Case(Box::new(
                service.update_case(&principal, case_id, patch, version)?,
            )))
        }
        Request::DeleteCase { token, case_id } => {
            let principal = service.authenticate(&token)?;
            service.delete_case(&principal, case_id)?;
            Ok(ResponsePayload::Done { done: true })
        }
        Request::SandboxView { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Sandbox(
                service.sandbox_view(&principal, case_id)?,
            ))
        }
        Request::UpdateIdentifiers { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Case(Box::new(
                service.reassign_identifiers(&principal, case_id)?,
            )))
        }
        Request::PublishCase { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Snapshot(Box::new(
                service.publish_case(&principal, case_id)?,
            )))
        }
        Request::GetSnapshot { token, snapshot_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Snapshot(Box::new(
                service.get_snapshot(&principal, snapshot_id)?,
            )))
        }
        Request::ListSnapshots { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Snapshots(
                service.list_snapshots(&principal, case_id)?,
            ))
        }
        Request::ShareWith {
            token,
            case_id,
            entries,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Share(
                service.share_with(&principal, case_id, &entries)?,
            ))
        }
        Request::ShareState { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Share(
                service.share_state(&principal, case_id)?,
            ))
        }

        Request::CreateElement {
            token,
            case_id,
            element,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Element(
                service.create_element(&principal, case_id, element)?,
            ))
        }
        Request::GetElement { token, element_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Body(
                service.get_element(&principal, element_id)?,
            ))
        }
        Request::UpdateElement {
            token,
            element_id,
            patch,
            version,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Element(
                service.update_element(&principal, element_id, patch, version)?,
            ))
        }
        Request::DeleteElement { token, element_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Deleted {
                deleted: service.delete_element(&principal, element_id)?,
            })
        }
        Request::Detach {
            token,
            element_id,
            parent_info,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Element(
                service.detach(&principal, element_id, parent_info)?,
            ))
        }
        Request::Attach {
            token,
            element_id,
            parent_info,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Element(
                service.attach(&principal, element_id, parent_info)?,
            ))
        }
        Request::SetClaimParent {
            token,
            element_id,
            parent_info,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Element(service.set_claim_parent(
                &principal,
                element_id,
                parent_info,
            )?))
        }

        Request::CreateComment {
            token,
            case_id,
            target,
            content,
        } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::CommentCreated {
                comment_id: service.create_comment(&principal, case_id, target, &content)?,
            })
        }
        Request::ListComments { token, case_id } => {
            let principal = service.authenticate(&token)?;
            Ok(ResponsePayload::Comments(
                service.list_comments(&principal, case_id)?,
            ))
        }
        Request::DeleteComment {
            token,
            case_id,
            comment_id,
        } => {
            let principal = service.authenticate(&token)?;
            service.delete_comment(&principal, case_id, comment_id)?;
            Ok(ResponsePayload::Done { done: true })
        }
    }
}

// =============================================================================
// Realtime channel
// =============================================================================

#[allow(clippy::too_many_arguments)]
fn run_channel(
    reader: BufReader<UnixStream>,
    writer: &mut UnixStream,
    service: &Service,
    config: &Config,
    token: &Token,
    case_id: crate::core::CaseId,
    channel_key: Option<String>,
    origin: Option<String>,
) {
    let principal = match admit(service, config, token, case_id, origin.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            let _ = write_response(writer, &Response::err(e));
            return;
        }
    };

    let channel_key =
        channel_key.unwrap_or_else(|| format!("ch-{}", uuid::Uuid::new_v4().simple()));
    let subscription = match service.subscribe(&principal, case_id, &channel_key) {
        Ok(s) => s,
        Err(e) => {
            let _ = write_response(writer, &Response::err(e));
            return;
        }
    };

    tracing::info!(
        case = %case_id,
        user = %principal.username,
        channel = %channel_key,
        "channel open"
    );

    // Writer thread drains the topic queue onto the socket; it exits when
    // the subscription is dropped (unsubscribe, replacement, lag) or the
    // peer goes away.
    let write_half = match writer.try_clone() {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to clone channel stream");
            let _ = service.unsubscribe(case_id, &channel_key);
            return;
        }
    };
    let writer_handle = std::thread::spawn(move || {
        let mut write_half = write_half;
        while let Ok(message) = subscription.recv() {
            let Ok(bytes) = encode_message(&message) else {
                continue;
            };
            if write_half.write_all(&bytes).is_err() || write_half.flush().is_err() {
                break;
            }
        }
        let _ = write_half.shutdown(std::net::Shutdown::Both);
    });

    // This thread keeps reading client case messages until disconnect.
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = service.handle_client_message(&principal, case_id, &channel_key, &line) {
            tracing::warn!(error = %e, "client message failed");
        }
    }

    let _ = service.unsubscribe(case_id, &channel_key);
    let _ = writer_handle.join();
    tracing::info!(case = %case_id, channel = %channel_key, "channel closed");
}

/// Admission: token, origin allow-list, then `can_read` (checked by
/// `Service::subscribe`).
fn admit(
    service: &Service,
    config: &Config,
    token: &Token,
    case_id: crate::core::CaseId,
    origin: Option<&str>,
) -> Result<Principal, OpError> {
    let principal = service.authenticate(token)?;
    let realtime = &config.realtime;
    if !realtime.allowed_origins.is_empty() && !realtime.debug_skip_origin_check {
        let allowed = origin
            .map(|o| realtime.allowed_origins.iter().any(|a| a == o))
            .unwrap_or(false);
        if !allowed {
            return Err(OpError::Forbidden {
                required: Role::View,
            });
        }
    }
    Ok(principal)
}
