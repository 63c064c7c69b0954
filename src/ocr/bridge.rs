//! Neural recognizers reached through an external model bridge.
//!
//! The bridge is a Python worker (`bridge/neural_ocr.py`) started once per
//! [`BridgeModel`] with `<script> serve --model <id>`. It loads the model, prints
//! `{"ready": true}` and then answers one JSON request per line:
//!
//! - `{"action": "generate", "image": <png>, "max_length": <n>, "prompt": <p>}`
//!   is answered with `{"token_ids": [..]}`
//! - `{"action": "decode", "token_ids": [..]}` is answered with `{"text": ".."}`
//!
//! Any request may instead be answered with `{"error": ".."}`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, ScanError};
use crate::ocr::process::{bounded, runtime};
use crate::ocr::OcrBackend;

/// Encoder-decoder vision model split at the token boundary.
pub trait SequenceModel: Send + Sync {
    fn name(&self) -> &str;
    fn generate_tokens(&self, image: &GrayImage) -> Result<Vec<u32>>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NeuralModel {
    TrOcr,
    Donut,
}

impl NeuralModel {
    pub fn display_name(&self) -> &'static str {
        match self {
            NeuralModel::TrOcr => "TrOCR",
            NeuralModel::Donut => "Donut",
        }
    }

    pub fn default_model_id(&self) -> &'static str {
        match self {
            NeuralModel::TrOcr => "microsoft/trocr-base-printed",
            NeuralModel::Donut => "naver-clova-ix/donut-base-finetuned-docvqa",
        }
    }

    /// Donut answers a question about the page rather than transcribing it.
    pub fn default_prompt(&self) -> Option<&'static str> {
        match self {
            NeuralModel::TrOcr => None,
            NeuralModel::Donut => Some(
                "<s_docvqa><s_question>what is shown in this document?</s_question><s_answer>",
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum BridgeRequest<'a> {
    Generate {
        image: &'a Path,
        max_length: u32,
        prompt: Option<&'a str>,
    },
    Decode {
        token_ids: &'a [u32],
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BridgeReply {
    ready: bool,
    token_ids: Option<Vec<u32>>,
    text: Option<String>,
    error: Option<String>,
}

/// One running worker process with its pipes.
struct BridgeSession {
    // Held for `kill_on_drop`.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl BridgeSession {
    async fn read_reply(&mut self) -> Result<BridgeReply> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| ScanError::Recognition(format!("bridge read failed: {e}")))?;
        if read == 0 {
            return Err(ScanError::Recognition("bridge exited unexpectedly".into()));
        }
        let reply: BridgeReply = serde_json::from_str(line.trim()).map_err(|e| {
            ScanError::Recognition(format!("malformed bridge reply {:?}: {e}", line.trim()))
        })?;
        match reply.error {
            Some(error) => Err(ScanError::Recognition(format!("bridge error: {error}"))),
            None => Ok(reply),
        }
    }

    async fn call(&mut self, request: &BridgeRequest<'_>) -> Result<BridgeReply> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| ScanError::Recognition(format!("cannot encode bridge request: {e}")))?;
        line.push(b'\n');
        self.stdin
            .write_all(&line)
            .await
            .map_err(|e| ScanError::Recognition(format!("bridge write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ScanError::Recognition(format!("bridge write failed: {e}")))?;
        self.read_reply().await
    }
}

/// TrOCR or Donut served by a long-lived bridge process.
///
/// The worker is spawned on first use and then shared by every page (and by
/// clones of this value), so the model is loaded once per run. Model loading
/// is not counted against the per-call timeout. A call that times out or
/// breaks the protocol kills the worker; the next call starts a fresh one.
#[derive(Clone)]
pub struct BridgeModel {
    kind: NeuralModel,
    python: PathBuf,
    script: PathBuf,
    model_id: String,
    prompt: Option<String>,
    max_length: u32,
    timeout: Option<Duration>,
    session: Arc<Mutex<Option<BridgeSession>>>,
}

impl fmt::Debug for BridgeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeModel")
            .field("kind", &self.kind)
            .field("python", &self.python)
            .field("script", &self.script)
            .field("model_id", &self.model_id)
            .field("max_length", &self.max_length)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BridgeModel {
    pub fn new(kind: NeuralModel) -> Self {
        Self {
            kind,
            python: PathBuf::from("python3"),
            script: PathBuf::from("bridge/neural_ocr.py"),
            model_id: kind.default_model_id().to_string(),
            prompt: kind.default_prompt().map(str::to_string),
            max_length: 512,
            timeout: None,
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_interpreter(mut self, python: PathBuf) -> Self {
        self.python = python;
        self
    }

    pub fn with_script(mut self, script: PathBuf) -> Self {
        self.script = script;
        self
    }

    pub fn with_model_id(mut self, model_id: String) -> Self {
        self.model_id = model_id;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> NeuralModel {
        self.kind
    }

    /// Start the worker now instead of on the first page.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(runtime()?.block_on(self.spawn())?);
        }
        Ok(())
    }

    /// Stop the worker; a later call starts a new one.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.session.lock() {
            guard.take();
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<BridgeSession>>> {
        self.session
            .lock()
            .map_err(|_| ScanError::Recognition("bridge session lock poisoned".into()))
    }

    async fn spawn(&self) -> Result<BridgeSession> {
        let name = self.kind.display_name();
        let mut child = Command::new(&self.python)
            .arg(&self.script)
            .arg("serve")
            .arg("--model")
            .arg(&self.model_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::Recognition(format!("failed to start {name} bridge: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ScanError::Recognition(format!("{name} bridge has no stdio")));
        };
        let mut session = BridgeSession {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let reply = session.read_reply().await?;
        if !reply.ready {
            return Err(ScanError::Recognition(format!(
                "{name} bridge did not report ready"
            )));
        }
        info!(model = %self.model_id, "{name} bridge ready");
        Ok(session)
    }

    fn request(&self, request: &BridgeRequest<'_>) -> Result<BridgeReply> {
        let mut guard = self.lock()?;
        let rt = runtime()?;
        rt.block_on(async {
            if guard.is_none() {
                *guard = Some(self.spawn().await?);
            }
            let result = match guard.as_mut() {
                Some(session) => bounded(self.timeout, session.call(request)).await,
                None => Err(ScanError::Recognition("bridge not running".into())),
            };
            if let Err(e) = &result {
                warn!(model = %self.model_id, error = %e, "restarting bridge on next call");
                guard.take();
            }
            result
        })
    }
}

impl SequenceModel for BridgeModel {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn generate_tokens(&self, image: &GrayImage) -> Result<Vec<u32>> {
        let input = tempfile::Builder::new()
            .prefix("smartscan-neural-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| ScanError::Recognition(format!("cannot create bridge input: {e}")))?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| ScanError::Recognition(format!("cannot write bridge input: {e}")))?;
        debug!(model = %self.model_id, "generating tokens");

        let reply = self.request(&BridgeRequest::Generate {
            image: input.path(),
            max_length: self.max_length,
            prompt: self.prompt.as_deref(),
        })?;
        reply
            .token_ids
            .ok_or_else(|| ScanError::Recognition("bridge reply has no token_ids".into()))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let reply = self.request(&BridgeRequest::Decode { token_ids: tokens })?;
        reply
            .text
            .ok_or_else(|| ScanError::Recognition("bridge reply has no text".into()))
    }
}

/// Adapts a [`SequenceModel`] to the [`OcrBackend`] interface.
pub struct NeuralBackend<M> {
    model: M,
}

impl<M: SequenceModel> NeuralBackend<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: SequenceModel> OcrBackend for NeuralBackend<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn recognize_text(&self, image: &GrayImage, _lang: &str) -> Result<String> {
        let tokens = self.model.generate_tokens(image)?;
        let text = self.model.decode(&tokens)?;
        Ok(text.trim().to_string())
    }
}
