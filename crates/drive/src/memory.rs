//! In-process provider for tests.
//!
//! Implements both the management gateway and the resumable session
//! protocol, records every chunk it receives, and can be scripted to fail.

use crate::error::{GatewayError, TransferError};
use crate::gateway::{
    NewPermission, Permission, RemoteObject, RemoteStorageGateway, SessionTarget,
    FOLDER_MIME_TYPE,
};
use crate::resumable::{Chunk, ResumableTransport, TransferProgress};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

const SESSION_PREFIX: &str = "memory://session/";

/// Scripted misbehaviour applied to the next probe or chunk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail without a response
    Network,
    /// Answer with this status and no state change
    Status(u16),
    /// Accept the chunk but keep `n` fewer bytes than were sent
    Truncate(u64),
    /// Never answer; only cancellation ends the call
    Stall,
    /// Answer 308 without a `Range` header and keep nothing
    NoProgress,
    /// Answer 200 with a body that carries no object id
    Unidentified,
}

/// A chunk as the provider saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedChunk {
    pub session_url: String,
    pub start: u64,
    pub len: u64,
    pub content_range: String,
}

#[derive(Debug, Clone)]
struct StoredObject {
    name: String,
    mime_type: String,
    parents: Vec<String>,
    data: Option<Bytes>,
}

#[derive(Debug)]
struct Session {
    target: SessionTarget,
    received: Vec<u8>,
    object_id: Option<String>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    objects: HashMap<String, StoredObject>,
    sessions: HashMap<String, Session>,
    chunks: Vec<ReceivedChunk>,
    probes: usize,
    faults: VecDeque<Fault>,
    permissions: HashMap<String, Vec<Permission>>,
    unavailable: bool,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryDrive {
    state: Arc<Mutex<State>>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a fault for the next probe or chunk call
    pub fn push_fault(&self, fault: Fault) {
        self.state().faults.push_back(fault);
    }

    /// Make every management call fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn chunks(&self) -> Vec<ReceivedChunk> {
        self.state().chunks.clone()
    }

    pub fn probe_count(&self) -> usize {
        self.state().probes
    }

    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Bytes the provider holds for a session so far
    pub fn received_bytes(&self, session_url: &str) -> Option<u64> {
        self.state()
            .sessions
            .get(session_url)
            .map(|s| s.received.len() as u64)
    }

    pub fn contains_object(&self, object_id: &str) -> bool {
        self.state().objects.contains_key(object_id)
    }

    pub fn object_data(&self, object_id: &str) -> Option<Bytes> {
        self.state()
            .objects
            .get(object_id)
            .and_then(|o| o.data.clone())
    }

    /// Place an object directly, bypassing the upload protocol
    pub fn insert_object(&self, name: &str, mime_type: &str, data: impl Into<Bytes>) -> String {
        self.place_object(Vec::new(), name, mime_type, data.into())
    }

    /// Like `insert_object`, inside the folder `parent`
    pub fn insert_object_in(
        &self,
        parent: &str,
        name: &str,
        mime_type: &str,
        data: impl Into<Bytes>,
    ) -> String {
        self.place_object(vec![parent.to_string()], name, mime_type, data.into())
    }

    fn place_object(&self, parents: Vec<String>, name: &str, mime_type: &str, data: Bytes) -> String {
        let mut state = self.state();
        let id = state.next_id("obj");
        state.objects.insert(
            id.clone(),
            StoredObject {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                parents,
                data: Some(data),
            },
        );
        id
    }

    fn take_fault(&self) -> Option<Fault> {
        self.state().faults.pop_front()
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.state().unavailable {
            return Err(GatewayError::Unavailable("memory drive offline".into()));
        }
        Ok(())
    }

    async fn apply_fault(
        fault: &Fault,
        cancel: &CancellationToken,
    ) -> Option<Result<TransferProgress, TransferError>> {
        match fault {
            Fault::Network => Some(Err(TransferError::Network("connection reset".into()))),
            Fault::Status(status) => Some(Err(TransferError::from_status(
                *status,
                "scripted failure".into(),
            ))),
            Fault::Stall => {
                cancel.cancelled().await;
                Some(Err(TransferError::Cancelled))
            }
            Fault::NoProgress => Some(Ok(TransferProgress::Incomplete { next_offset: 0 })),
            Fault::Unidentified => Some(Ok(TransferProgress::Complete { object_id: None })),
            Fault::Truncate(_) => None,
        }
    }

    fn finish_session(state: &mut State, session_url: &str) -> TransferProgress {
        let (target, data, existing) = match state.sessions.get(session_url) {
            Some(session) => (
                session.target.clone(),
                session.received.clone(),
                session.object_id.clone(),
            ),
            None => return TransferProgress::Incomplete { next_offset: 0 },
        };
        if let Some(object_id) = existing {
            return TransferProgress::Complete {
                object_id: Some(object_id),
            };
        }
        let object_id = state.next_id("obj");
        state.objects.insert(
            object_id.clone(),
            StoredObject {
                name: target.name,
                mime_type: target.mime_type,
                parents: vec![target.parent_folder],
                data: Some(Bytes::from(data)),
            },
        );
        if let Some(session) = state.sessions.get_mut(session_url) {
            session.object_id = Some(object_id.clone());
        }
        TransferProgress::Complete {
            object_id: Some(object_id),
        }
    }
}

#[async_trait]
impl ResumableTransport for MemoryDrive {
    async fn probe(
        &self,
        session_url: &str,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError> {
        self.state().probes += 1;
        if let Some(fault) = self.take_fault() {
            if let Some(result) = Self::apply_fault(&fault, cancel).await {
                return result;
            }
        }

        let state = self.state();
        let session = state
            .sessions
            .get(session_url)
            .ok_or_else(|| TransferError::Rejected {
                status: 404,
                body: "session expired".into(),
            })?;
        if session.target.size != total {
            return Err(TransferError::Rejected {
                status: 400,
                body: "size mismatch".into(),
            });
        }
        match &session.object_id {
            Some(id) => Ok(TransferProgress::Complete {
                object_id: Some(id.clone()),
            }),
            None => Ok(TransferProgress::Incomplete {
                next_offset: session.received.len() as u64,
            }),
        }
    }

    async fn put_chunk(
        &self,
        session_url: &str,
        chunk: Chunk,
        cancel: &CancellationToken,
    ) -> Result<TransferProgress, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let fault = self.take_fault();
        if let Some(fault) = &fault {
            if let Some(result) = Self::apply_fault(fault, cancel).await {
                return result;
            }
        }

        let mut state = self.state();
        state.chunks.push(ReceivedChunk {
            session_url: session_url.to_string(),
            start: chunk.start,
            len: chunk.data.len() as u64,
            content_range: chunk.content_range(),
        });

        let session = state
            .sessions
            .get_mut(session_url)
            .ok_or_else(|| TransferError::Rejected {
                status: 404,
                body: "session expired".into(),
            })?;
        if chunk.total != session.target.size {
            return Err(TransferError::Rejected {
                status: 400,
                body: "size mismatch".into(),
            });
        }
        if session.object_id.is_some() {
            return Ok(Self::finish_session(&mut state, session_url));
        }

        let held = session.received.len() as u64;
        if chunk.start != held {
            // Out of place: tell the client where to continue
            return Ok(TransferProgress::Incomplete { next_offset: held });
        }

        session.received.extend_from_slice(&chunk.data);
        if let Some(Fault::Truncate(lost)) = fault {
            let keep = session.received.len().saturating_sub(lost as usize);
            session.received.truncate(keep);
        }

        let held = session.received.len() as u64;
        if held >= session.target.size {
            return Ok(Self::finish_session(&mut state, session_url));
        }
        Ok(TransferProgress::Incomplete { next_offset: held })
    }
}

#[async_trait]
impl RemoteStorageGateway for MemoryDrive {
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        let id = state.next_id("folder");
        state.objects.insert(
            id.clone(),
            StoredObject {
                name: name.to_string(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                parents: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
                data: None,
            },
        );
        Ok(id)
    }

    async fn open_resumable_session(&self, target: &SessionTarget) -> Result<String, GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        let id = state.next_id("upload");
        let url = format!("{}{}", SESSION_PREFIX, id);
        state.sessions.insert(
            url.clone(),
            Session {
                target: target.clone(),
                received: Vec::new(),
                object_id: None,
            },
        );
        Ok(url)
    }

    async fn get_object(&self, object_id: &str) -> Result<RemoteObject, GatewayError> {
        self.check_available()?;
        let state = self.state();
        let object = state
            .objects
            .get(object_id)
            .ok_or_else(|| GatewayError::NotFound(object_id.to_string()))?;
        Ok(RemoteObject {
            id: object_id.to_string(),
            name: object.name.clone(),
            mime_type: object.mime_type.clone(),
            size: object.data.as_ref().map(|d| d.len() as u64),
            parents: object.parents.clone(),
        })
    }

    async fn download_object(&self, object_id: &str) -> Result<Bytes, GatewayError> {
        self.check_available()?;
        self.state()
            .objects
            .get(object_id)
            .and_then(|o| o.data.clone())
            .ok_or_else(|| GatewayError::NotFound(object_id.to_string()))
    }

    async fn delete_object(&self, object_id: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        state.permissions.remove(object_id);
        state
            .objects
            .remove(object_id)
            .map(|_| ())
            .ok_or_else(|| GatewayError::NotFound(object_id.to_string()))
    }

    async fn move_object(
        &self,
        object_id: &str,
        new_parent: &str,
        old_parent: &str,
    ) -> Result<(), GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        let object = state
            .objects
            .get_mut(object_id)
            .ok_or_else(|| GatewayError::NotFound(object_id.to_string()))?;
        object.parents.retain(|p| p != old_parent);
        object.parents.push(new_parent.to_string());
        Ok(())
    }

    async fn list_permissions(&self, object_id: &str) -> Result<Vec<Permission>, GatewayError> {
        self.check_available()?;
        let state = self.state();
        if !state.objects.contains_key(object_id) {
            return Err(GatewayError::NotFound(object_id.to_string()));
        }
        Ok(state.permissions.get(object_id).cloned().unwrap_or_default())
    }

    async fn create_permission(
        &self,
        object_id: &str,
        permission: &NewPermission,
    ) -> Result<Permission, GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        if !state.objects.contains_key(object_id) {
            return Err(GatewayError::NotFound(object_id.to_string()));
        }
        let created = Permission {
            id: state.next_id("perm"),
            role: permission.role.clone(),
            kind: permission.kind.clone(),
            email_address: permission.email_address.clone(),
        };
        state
            .permissions
            .entry(object_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn delete_permission(
        &self,
        object_id: &str,
        permission_id: &str,
    ) -> Result<(), GatewayError> {
        self.check_available()?;
        let mut state = self.state();
        let permissions = state
            .permissions
            .get_mut(object_id)
            .ok_or_else(|| GatewayError::NotFound(object_id.to_string()))?;
        let before = permissions.len();
        permissions.retain(|p| p.id != permission_id);
        if permissions.len() == before {
            return Err(GatewayError::NotFound(permission_id.to_string()));
        }
        Ok(())
    }
}
