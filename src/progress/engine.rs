//! Step-wise transformation of a document into an [`ObjectSink`]

use std::collections::VecDeque;

use log::{debug, trace, warn};
use rand::{thread_rng, RngCore};

use super::SaveFlags;
use crate::crypto::CipherId;
use crate::error::{PDFSecurityError, PDFSecurityResult};
use crate::handlers::{
    crypt_filter_entries, rms_license, verify_drm_dict, ContextMode, ContextRequest, Credentials,
    EncryptionParams, HandlerRegistry, FOXIT_DRM_FILTER, RMS_FILTER,
};
use crate::pdf::{Dictionary, Document, Object, ObjectId, ObjectSink, SinkHeader};
use crate::security::{decrypt_payload, encrypt_payload, transform_strings, DecryptSession, EncryptionContext};

/// Direction and scheme inputs of a pass
#[derive(Debug, Clone)]
pub enum Operation {
    Encrypt(EncryptionParams),
    Decrypt(Credentials),
}

/// Amount of work one step may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkBudget {
    /// Objects completed per step
    pub max_objects: usize,
    /// Payload bytes transformed per step; a longer stream spans several steps
    pub max_bytes: usize,
}

impl Default for WorkBudget {
    fn default() -> Self {
        Self {
            max_objects: 1,
            max_bytes: 64 * 1024,
        }
    }
}

/// Outcome of one step
#[derive(Debug)]
pub enum StepResult {
    TobeContinued,
    /// Trailer written and context released
    Finished,
    /// Context released and sink aborted
    Failed(PDFSecurityError),
}

impl StepResult {
    pub fn is_finished(&self) -> bool {
        matches!(self, StepResult::Finished)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepResult::TobeContinued)
    }
}

/// Asked between steps whether [`Progress::run`] should yield
pub trait PauseHandler {
    fn need_to_pause(&mut self) -> bool;
}

impl<F: FnMut() -> bool> PauseHandler for F {
    fn need_to_pause(&mut self) -> bool {
        self()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProgressState {
    NotStarted,
    Running,
    Finished,
    Failed(String),
}

struct QueuedObject {
    id: ObjectId,
    transform: bool,
}

/// A stream being decrypted across steps
struct StreamCursor {
    id: ObjectId,
    object: Object,
    offset: usize,
    output: Vec<u8>,
    session: DecryptSession,
}

/// What `start` resolved before the first step
struct Plan {
    context: EncryptionContext,
    trailer: Dictionary,
    /// Encryption dictionary written after the last object
    encrypt_object: Option<(ObjectId, Dictionary)>,
    /// Existing encryption dictionary object, never transformed or copied
    skip: Option<ObjectId>,
    encrypt_metadata: bool,
}

/// Resumable encrypt or decrypt pass over one document.
///
/// Objects are visited in ascending object number. Each
/// [`Progress::continue_step`] does a bounded amount of work set by the
/// [`WorkBudget`]; the encryption context lives exactly as long as the pass.
pub struct Progress<'a, S: ObjectSink> {
    document: &'a Document,
    sink: Option<S>,
    context: Option<EncryptionContext>,
    mode: ContextMode,
    queue: VecDeque<QueuedObject>,
    cursor: Option<StreamCursor>,
    trailer: Dictionary,
    encrypt_object: Option<(ObjectId, Dictionary)>,
    flags: SaveFlags,
    budget: WorkBudget,
    version: String,
    total: usize,
    done: usize,
    state: ProgressState,
}

impl<'a, S: ObjectSink> Progress<'a, S> {
    /// Validate flags, create the context and queue the objects of `document`
    pub fn start(
        registry: &HandlerRegistry,
        document: &'a Document,
        operation: Operation,
        sink: S,
        flags: SaveFlags,
        budget: WorkBudget,
    ) -> PDFSecurityResult<Self> {
        let mode = match operation {
            Operation::Encrypt(_) => ContextMode::Encrypt,
            Operation::Decrypt(_) => ContextMode::Decrypt,
        };
        let flags = flags.validate(mode == ContextMode::Encrypt)?;
        if budget.max_objects == 0 || budget.max_bytes == 0 {
            return Err(PDFSecurityError::invalid_param("work budget must allow some work"));
        }

        let plan = match &operation {
            Operation::Encrypt(params) => plan_encryption(registry, document, params)?,
            Operation::Decrypt(credentials) => plan_decryption(registry, document, credentials)?,
        };

        let reachable = flags
            .contains(SaveFlags::OPTIMIZE)
            .then(|| document.reachable_objects());
        let mut queue = VecDeque::new();
        for (id, object) in document.objects() {
            if plan.skip == Some(id) {
                continue;
            }
            if let Object::Stream(stream) = object {
                // Cross-reference data is rebuilt by the sink
                if stream.is_xref() {
                    continue;
                }
            }
            if reachable.as_ref().is_some_and(|reachable| !reachable.contains(&id)) {
                trace!("Dropping unreachable object {}", id);
                continue;
            }
            let clear_metadata =
                !plan.encrypt_metadata && matches!(object, Object::Stream(stream) if stream.is_metadata());
            queue.push_back(QueuedObject {
                id,
                transform: object.requires_encryption() && !clear_metadata,
            });
        }

        debug!(
            "Starting {:?} pass with filter {}: {} objects, flags {:?}",
            mode,
            plan.context.filter(),
            queue.len(),
            flags
        );
        Ok(Self {
            document,
            sink: Some(sink),
            context: Some(plan.context),
            mode,
            total: queue.len(),
            queue,
            cursor: None,
            trailer: plan.trailer,
            encrypt_object: plan.encrypt_object,
            flags,
            budget,
            version: document.version().to_string(),
            done: 0,
            state: ProgressState::NotStarted,
        })
    }

    /// Header version of the output; only before the first step
    pub fn set_file_version(&mut self, version: impl Into<String>) -> PDFSecurityResult<()> {
        let version = version.into();
        if version.is_empty() {
            return Err(PDFSecurityError::invalid_param("empty file version"));
        }
        if self.state != ProgressState::NotStarted {
            return Err(PDFSecurityError::invalid_param("file version must be set before the first step"));
        }
        self.version = version;
        Ok(())
    }

    pub fn flags(&self) -> SaveFlags {
        self.flags
    }

    /// Completion in percent
    pub fn percent(&self) -> u32 {
        match self.state {
            ProgressState::Finished => 100,
            _ if self.total == 0 => 0,
            _ => ((self.done * 100) / self.total).min(99) as u32,
        }
    }

    /// Do one bounded unit of work
    pub fn continue_step(&mut self) -> StepResult {
        match &self.state {
            ProgressState::Finished => return StepResult::Finished,
            ProgressState::Failed(reason) => {
                return StepResult::Failed(PDFSecurityError::unrecoverable(format!(
                    "pass already failed: {}",
                    reason
                )))
            }
            _ => {}
        }

        match self.step() {
            Ok(false) => {
                trace!("Step done, {} of {} objects", self.done, self.total);
                StepResult::TobeContinued
            }
            Ok(true) => {
                debug!("{:?} pass finished after {} objects", self.mode, self.done);
                self.state = ProgressState::Finished;
                StepResult::Finished
            }
            Err(err) => {
                warn!("{:?} pass failed at object {} of {}: {}", self.mode, self.done, self.total, err);
                self.abandon(err.to_string());
                StepResult::Failed(err)
            }
        }
    }

    /// Step until a terminal result or until `pause` asks to yield
    pub fn run<P: PauseHandler + ?Sized>(&mut self, pause: &mut P) -> StepResult {
        loop {
            let result = self.continue_step();
            if result.is_terminal() || pause.need_to_pause() {
                return result;
            }
        }
    }

    /// Step until the pass finishes or fails
    pub fn run_to_end(&mut self) -> PDFSecurityResult<()> {
        match self.run(&mut || false) {
            StepResult::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }

    /// Abandon the pass: release the context and abort the sink
    pub fn release(mut self) {
        self.abandon("released by caller".to_string());
    }

    /// Give the sink back; an unfinished pass is abandoned first
    pub fn into_sink(mut self) -> Option<S> {
        self.abandon("sink taken before completion".to_string());
        self.sink.take()
    }

    fn abandon(&mut self, reason: String) {
        if !matches!(self.state, ProgressState::NotStarted | ProgressState::Running) {
            return;
        }
        self.cursor = None;
        if let Some(context) = self.context.take() {
            context.close();
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.abort();
        }
        self.state = ProgressState::Failed(reason);
    }

    fn step(&mut self) -> PDFSecurityResult<bool> {
        if self.state == ProgressState::NotStarted {
            let header = SinkHeader {
                version: self.version.clone(),
                flags: self.flags,
            };
            self.sink_mut()?.begin(&header)?;
            self.state = ProgressState::Running;
        }

        let mut objects = 0;
        let mut bytes = 0;
        while objects < self.budget.max_objects && bytes < self.budget.max_bytes {
            let (consumed, completed) = if self.cursor.is_some() {
                self.advance_cursor(self.budget.max_bytes - bytes)?
            } else if let Some(queued) = self.queue.pop_front() {
                self.process(queued)?
            } else {
                break;
            };
            bytes += consumed;
            if completed {
                objects += 1;
            }
        }

        if self.queue.is_empty() && self.cursor.is_none() {
            self.write_tail()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn sink_mut(&mut self) -> PDFSecurityResult<&mut S> {
        self.sink
            .as_mut()
            .ok_or_else(|| PDFSecurityError::unrecoverable("sink already taken"))
    }

    fn write(&mut self, id: ObjectId, object: &Object) -> PDFSecurityResult<()> {
        self.sink_mut()?.write_object(id, object)?;
        self.done += 1;
        Ok(())
    }

    /// Transform one queued object; returns payload bytes and whether it was written
    fn process(&mut self, queued: QueuedObject) -> PDFSecurityResult<(usize, bool)> {
        let document = self.document;
        let id = queued.id;
        let object = document
            .get(id)
            .ok_or_else(|| PDFSecurityError::unrecoverable(format!("object {} vanished", id)))?;
        if !queued.transform {
            self.write(id, object)?;
            return Ok((0, true));
        }

        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PDFSecurityError::unrecoverable("context already released"))?;
        let mut out = object.clone();
        let mut bytes = match self.mode {
            ContextMode::Encrypt => {
                let mut encrypt = |plain: &[u8]| -> PDFSecurityResult<Vec<u8>> { encrypt_payload(context, id, plain) };
                transform_strings(&mut out, &mut encrypt)?
            }
            ContextMode::Decrypt => {
                let mut decrypt = |cipher: &[u8]| -> PDFSecurityResult<Vec<u8>> { decrypt_payload(context, id, cipher) };
                transform_strings(&mut out, &mut decrypt)?
            }
        };

        if self.mode == ContextMode::Decrypt && matches!(out, Object::Stream(_)) {
            let session = DecryptSession::open(context, id.number, id.generation)?;
            self.cursor = Some(StreamCursor {
                id,
                object: out,
                offset: 0,
                output: Vec::new(),
                session,
            });
            return Ok((bytes, false));
        }

        if let Object::Stream(stream) = &mut out {
            let encrypted = encrypt_payload(context, id, stream.data())?;
            bytes += stream.data().len();
            stream.set_data(encrypted);
        }
        self.write(id, &out)?;
        Ok((bytes, true))
    }

    /// Feed up to `allowance` bytes of the open stream; finish it at the end
    fn advance_cursor(&mut self, allowance: usize) -> PDFSecurityResult<(usize, bool)> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| PDFSecurityError::unrecoverable("no open stream"))?;
        let StreamCursor {
            object,
            offset,
            output,
            session,
            ..
        } = cursor;
        let Object::Stream(stream) = object else {
            return Err(PDFSecurityError::unrecoverable("stream cursor over a non-stream object"));
        };

        let data = stream.data();
        let end = offset.saturating_add(allowance).min(data.len());
        let consumed = end - *offset;
        if consumed > 0 {
            output.extend(session.feed(&data[*offset..end])?);
        }
        *offset = end;
        if end < data.len() {
            return Ok((consumed, false));
        }

        let Some(StreamCursor {
            id,
            mut object,
            mut output,
            session,
            ..
        }) = self.cursor.take()
        else {
            return Err(PDFSecurityError::unrecoverable("no open stream"));
        };
        output.extend(session.finish()?);
        if let Object::Stream(stream) = &mut object {
            stream.set_data(output);
        }
        self.write(id, &object)?;
        Ok((consumed, true))
    }

    /// Encryption dictionary and trailer, then context release
    fn write_tail(&mut self) -> PDFSecurityResult<()> {
        if let Some((id, dict)) = self.encrypt_object.take() {
            self.sink_mut()?.write_object(id, &Object::Dictionary(dict))?;
        }
        let trailer = std::mem::take(&mut self.trailer);
        self.sink_mut()?.finish(&trailer)?;
        if let Some(context) = self.context.take() {
            context.close();
        }
        Ok(())
    }
}

impl<S: ObjectSink> Drop for Progress<'_, S> {
    fn drop(&mut self) {
        if matches!(self.state, ProgressState::NotStarted | ProgressState::Running) {
            debug!("Progress dropped before completion; aborting sink");
            self.abandon("dropped".to_string());
        }
    }
}

impl<S: ObjectSink> std::fmt::Debug for Progress<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("done", &self.done)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

fn new_file_id() -> Vec<u8> {
    let mut id = vec![0u8; 16];
    thread_rng().fill_bytes(&mut id);
    id
}

fn plan_encryption(
    registry: &HandlerRegistry,
    document: &Document,
    params: &EncryptionParams,
) -> PDFSecurityResult<Plan> {
    if document.is_encrypted() {
        return Err(PDFSecurityError::invalid_param("document is already encrypted"));
    }
    if let EncryptionParams::Rms(rms) = params {
        rms.validate()?;
    }

    let existing_id = document.file_id().map(<[u8]>::to_vec);
    let file_id = existing_id.clone().unwrap_or_else(new_file_id);
    let credentials = Credentials::None;
    let request = ContextRequest {
        mode: ContextMode::Encrypt,
        filter: params.filter(),
        sub_filter: params.sub_filter(),
        encrypt_info: params.encrypt_info(),
        encrypt_dict: None,
        file_id: &file_id,
        document,
        params: Some(params),
        credentials: &credentials,
    };
    let mut context = EncryptionContext::create(registry, &request)?;
    let cipher = context.cipher_info()?.clone();

    let mut dict = Dictionary::new();
    dict.set("Filter", Object::name(params.filter()));
    if !params.sub_filter().is_empty() {
        dict.set("SubFilter", Object::name(params.sub_filter()));
    }
    if matches!(cipher.cipher(), CipherId::Rc4 | CipherId::Aes) {
        crypt_filter_entries(&cipher, &mut dict);
    }
    match params {
        EncryptionParams::Custom(custom) if !custom.encrypt_info.is_empty() => {
            dict.set("EncryptInfo", Object::string(custom.encrypt_info.clone()));
        }
        EncryptionParams::Rms(rms) => rms.write_entries(&mut dict),
        _ => {}
    }
    if !params.encrypt_metadata() {
        dict.set("EncryptMetadata", false);
    }
    for (key, value) in context.handler()?.encryption_entries()?.iter() {
        dict.set(key, value.clone());
    }

    let encrypt_id = ObjectId::new(document.max_object_number() + 1, 0);
    let mut trailer = document.trailer().clone();
    trailer.set("Encrypt", encrypt_id);
    if existing_id.is_none() {
        trailer.set("ID", vec![Object::string(file_id.clone()), Object::string(file_id)]);
    }

    Ok(Plan {
        context,
        trailer,
        encrypt_object: Some((encrypt_id, dict)),
        skip: None,
        encrypt_metadata: params.encrypt_metadata(),
    })
}

fn plan_decryption(
    registry: &HandlerRegistry,
    document: &Document,
    credentials: &Credentials,
) -> PDFSecurityResult<Plan> {
    let dict = document
        .encryption_dict()
        .ok_or_else(|| PDFSecurityError::invalid_param("document is not encrypted"))?;
    let filter = dict
        .get_name("Filter")
        .ok_or_else(|| PDFSecurityError::malformed("encryption dictionary without /Filter"))?;
    if filter == FOXIT_DRM_FILTER && !verify_drm_dict(dict) {
        return Err(PDFSecurityError::VerificationFailed);
    }

    let encrypt_info = if filter == RMS_FILTER {
        rms_license(dict)
    } else {
        dict.get_string("EncryptInfo")
    };
    let request = ContextRequest {
        mode: ContextMode::Decrypt,
        filter,
        sub_filter: dict.get_name("SubFilter").unwrap_or_default(),
        encrypt_info: encrypt_info.unwrap_or_default(),
        encrypt_dict: Some(dict),
        file_id: document.file_id().unwrap_or_default(),
        document,
        params: None,
        credentials,
    };
    let mut context = EncryptionContext::create(registry, &request)?;
    context.cipher_info()?;

    let mut trailer = document.trailer().clone();
    trailer.remove("Encrypt");

    Ok(Plan {
        context,
        trailer,
        encrypt_object: None,
        skip: document.encrypt_ref(),
        encrypt_metadata: encrypts_metadata(dict),
    })
}

/// `/EncryptMetadata` at the top level or in the stream crypt filter
fn encrypts_metadata(dict: &Dictionary) -> bool {
    dict.get_bool("EncryptMetadata")
        .or_else(|| {
            let name = dict.get_name("StmF")?;
            dict.get_dict("CF")?.get_dict(name)?.get_bool("EncryptMetadata")
        })
        .unwrap_or(true)
}
