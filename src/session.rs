//! Conversation and file state for one client session.
//!
//! Everything here is synchronous: the app loop starts an operation with a
//! `begin_*`/`request_*` call, runs the network part elsewhere, and feeds the
//! outcome back through the matching `finish_*`/`apply_*` call.

use std::path::{Path, PathBuf};

pub const MAX_PENDING_FILES: usize = 5;

pub const NO_RESPONSE: &str = "No response found.";
pub const QUERY_FAILED: &str = "Error: Unable to fetch response.";
pub const UPLOAD_SUCCEEDED: &str = "Files uploaded successfully.";
pub const UPLOAD_FAILED: &str = "Error uploading files.";
pub const DOWNLOAD_FAILED: &str = "Error downloading the file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// Display name for a local path: its last component, or the whole path
/// when it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    pub name: String,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        let name = file_name(&path);
        Self { path, name }
    }
}

/// Local validation failures. The display text is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("You can only upload up to 5 files at a time.")]
    TooManyFiles,
    #[error("Please select files first!")]
    NothingToUpload,
    #[error("An upload is already in progress.")]
    UploadInProgress,
    #[error("Please select a file to download!")]
    NoDownloadTarget,
}

#[derive(Debug, Default)]
pub struct Session {
    messages: Vec<Message>,
    pending: Vec<PendingFile>,
    uploaded: Vec<String>,
    selected_file: Option<String>,
    queries_in_flight: usize,
    uploading: bool,
    pub listening: bool,
    pub tts_enabled: bool,
    // Ids for uploaded-list fetches, so a slow stale response can't
    // overwrite a newer one.
    last_list_request: u64,
    last_list_applied: u64,
}

impl Session {
    pub fn new(tts_enabled: bool) -> Self {
        Self {
            tts_enabled,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_files(&self) -> &[PendingFile] {
        &self.pending
    }

    pub fn uploaded_files(&self) -> &[String] {
        &self.uploaded
    }

    pub fn selected_file(&self) -> Option<&str> {
        self.selected_file.as_deref()
    }

    pub fn loading(&self) -> bool {
        self.queries_in_flight > 0
    }

    pub fn uploading(&self) -> bool {
        self.uploading
    }

    /// Records the user's message and returns the text to send, or `None`
    /// when there is nothing to send.
    pub fn begin_query(&mut self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.messages.push(Message::user(trimmed));
        self.queries_in_flight += 1;
        Some(trimmed.to_string())
    }

    /// Appends the bot reply for a finished query and returns its text.
    pub fn finish_query(&mut self, outcome: Result<Option<String>, String>) -> String {
        self.queries_in_flight = self.queries_in_flight.saturating_sub(1);
        let reply = match outcome {
            Ok(answer) => answer
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| NO_RESPONSE.to_string()),
            Err(e) => {
                tracing::error!("Query failed: {}", e);
                QUERY_FAILED.to_string()
            }
        };
        self.messages.push(Message::bot(reply.clone()));
        reply
    }

    /// Adds a batch of files to the pending set. The batch is taken whole
    /// or not at all.
    pub fn select_files(&mut self, paths: Vec<PathBuf>) -> Result<(), Rejection> {
        if paths.is_empty() {
            return Ok(());
        }
        if self.pending.len() + paths.len() > MAX_PENDING_FILES {
            return Err(Rejection::TooManyFiles);
        }
        self.pending.extend(paths.into_iter().map(PendingFile::new));
        Ok(())
    }

    pub fn remove_file(&mut self, index: usize) -> Option<PendingFile> {
        if index < self.pending.len() {
            Some(self.pending.remove(index))
        } else {
            None
        }
    }

    pub fn begin_upload(&mut self) -> Result<Vec<PathBuf>, Rejection> {
        if self.pending.is_empty() {
            return Err(Rejection::NothingToUpload);
        }
        if self.uploading {
            return Err(Rejection::UploadInProgress);
        }
        self.uploading = true;
        Ok(self.pending.iter().map(|f| f.path.clone()).collect())
    }

    /// Applies an upload outcome. Returns true when the uploaded-file list
    /// should be fetched again.
    pub fn finish_upload(&mut self, outcome: Result<Option<String>, String>) -> bool {
        self.uploading = false;
        match outcome {
            Ok(message) => {
                let text = message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UPLOAD_SUCCEEDED.to_string());
                self.messages.push(Message::bot(text));
                self.pending.clear();
                true
            }
            Err(e) => {
                tracing::error!("Error uploading files: {}", e);
                self.messages.push(Message::bot(UPLOAD_FAILED));
                false
            }
        }
    }

    /// Issues an id for a new uploaded-file list fetch.
    pub fn request_file_list(&mut self) -> u64 {
        self.last_list_request += 1;
        self.last_list_request
    }

    /// Replaces the uploaded-file list unless a newer fetch already landed.
    /// Returns whether anything changed.
    pub fn apply_file_list(&mut self, request_id: u64, outcome: Result<Vec<String>, String>) -> bool {
        if request_id < self.last_list_applied {
            tracing::debug!(
                "Dropping stale file list #{} (have #{})",
                request_id,
                self.last_list_applied
            );
            return false;
        }
        match outcome {
            Ok(files) => {
                self.uploaded = files;
                self.last_list_applied = request_id;
                true
            }
            Err(e) => {
                tracing::error!("Error fetching uploaded files: {}", e);
                false
            }
        }
    }

    pub fn select_download_target(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.selected_file = if name.is_empty() { None } else { Some(name) };
    }

    pub fn download_target(&self) -> Result<String, Rejection> {
        self.selected_file.clone().ok_or(Rejection::NoDownloadTarget)
    }

    pub fn toggle_tts(&mut self) -> bool {
        self.tts_enabled = !self.tts_enabled;
        self.tts_enabled
    }
}
