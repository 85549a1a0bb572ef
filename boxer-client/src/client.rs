//! The allocation facade: pool plus controller behind one handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use boxer_core::BoxerConfig;
use boxer_engine::{CommandController, EngineError, ProcessIo, VmCompose, VmContext, VmController};

use crate::request::{box_key, BoxInfo, BoxerRequest, BoxerResponse, ReturnCode};
use crate::ClientError;

/// Allocates boxes from a [`VmCompose`] pool and runs operations on them.
///
/// All methods take `&self`; wrap the client in an `Arc` to share it between
/// tasks. Operations on one client are serialized by its controller.
pub struct BoxerClient<C: VmController = CommandController> {
    pool: VmCompose,
    controller: C,
    boxes: Mutex<HashMap<String, Arc<VmContext>>>,
}

impl BoxerClient<CommandController> {
    /// Validate `config` and build a client that runs its command templates.
    ///
    /// Child processes get `stdin`/`stdout`; stderr is discarded.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if validation fails and
    /// [`ClientError::Engine`] if the pool cannot be built.
    pub fn from_config(
        config: &BoxerConfig,
        stdin: ProcessIo,
        stdout: ProcessIo,
    ) -> Result<Self, ClientError> {
        let controller = CommandController::from_config(config, stdin, stdout);
        Self::with_controller(config, controller)
    }
}

impl<C: VmController> BoxerClient<C> {
    /// Validate `config` and build a client around a custom controller.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if validation fails and
    /// [`ClientError::Engine`] if the pool cannot be built.
    pub fn with_controller(config: &BoxerConfig, controller: C) -> Result<Self, ClientError> {
        config.validate()?;
        let pool = VmCompose::from_config(config)?;
        Ok(Self { pool, controller, boxes: Mutex::new(HashMap::new()) })
    }

    /// The underlying pool, for introspection.
    #[must_use]
    pub fn pool(&self) -> &VmCompose {
        &self.pool
    }

    /// The controller that runs operations on allocated boxes.
    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Allocate a box from `group`.
    ///
    /// # Errors
    /// - [`ClientError::InvalidRequest`] if `group` is empty.
    /// - [`ClientError::Full`] if the group is exhausted or the quota is reached.
    /// - [`ClientError::Engine`] for an unknown group or a pool fault.
    ///
    /// # Panics
    /// Panics if the internal box registry lock is poisoned.
    pub fn balloc(&self, group: &str) -> Result<BoxInfo, ClientError> {
        if group.is_empty() {
            return Err(ClientError::InvalidRequest("group cannot be empty".to_owned()));
        }

        let Some(ctx) = self.pool.allocate(group)? else {
            return Err(ClientError::Full { group: group.to_owned() });
        };

        let key = box_key(ctx.group(), ctx.machine());
        let mut boxes = self.boxes();
        if boxes.contains_key(&key) {
            drop(boxes);
            self.pool.free(&ctx)?;
            return Err(ClientError::Engine(EngineError::Internal(format!(
                "box {key} was handed out twice"
            ))));
        }
        boxes.insert(key, Arc::clone(&ctx));
        drop(boxes);

        Ok(BoxInfo::from(ctx.as_ref()))
    }

    /// Return an allocated box to the pool.
    ///
    /// # Errors
    /// Returns [`ClientError::NotAllocated`] if the box is not held by this
    /// client, or [`ClientError::Engine`] if the pool rejects the free.
    ///
    /// # Panics
    /// Panics if the internal box registry lock is poisoned.
    pub fn bfree(&self, info: &BoxInfo) -> Result<(), ClientError> {
        let key = info.key();
        let mut boxes = self.boxes();
        let ctx = boxes.get(&key).cloned().ok_or_else(|| not_allocated(info))?;
        self.pool.free(&ctx)?;
        boxes.remove(&key);
        Ok(())
    }

    /// Run the requested operation on an allocated box.
    ///
    /// # Errors
    /// Returns [`ClientError::NotAllocated`] if the box is not held by this
    /// client, or [`ClientError::Engine`] with the controller's error.
    ///
    /// # Panics
    /// Panics if the internal box registry lock is poisoned.
    pub async fn execute(&self, request: &BoxerRequest) -> Result<BoxerResponse, ClientError> {
        let ctx = self
            .boxes()
            .get(&request.box_info.key())
            .cloned()
            .ok_or_else(|| not_allocated(&request.box_info))?;

        tracing::debug!(op = %request.op, box_key = %request.box_info.key(), "executing request");
        self.controller.execute(request.op.into(), &ctx).await?;

        Ok(BoxerResponse { code: ReturnCode::Success, box_info: BoxInfo::from(ctx.as_ref()) })
    }

    /// Fresh snapshots of every box this client currently holds, sorted by key.
    ///
    /// # Panics
    /// Panics if the internal box registry lock is poisoned.
    #[must_use]
    pub fn allocated(&self) -> Vec<BoxInfo> {
        let mut held: Vec<BoxInfo> =
            self.boxes().values().map(|ctx| BoxInfo::from(ctx.as_ref())).collect();
        held.sort_by_key(BoxInfo::key);
        held
    }

    fn boxes(&self) -> MutexGuard<'_, HashMap<String, Arc<VmContext>>> {
        #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
        let guard = self.boxes.lock().expect("box registry lock poisoned");
        guard
    }
}

impl<C: VmController> std::fmt::Debug for BoxerClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxerClient").field("pool", &self.pool).finish_non_exhaustive()
    }
}

fn not_allocated(info: &BoxInfo) -> ClientError {
    ClientError::NotAllocated { group: info.group.clone(), machine: info.machine.clone() }
}
