use crate::config::Config;
use crate::downloads::save_download;
use crate::gateway::Gateway;
use crate::session::{Rejection, Session, DOWNLOAD_FAILED};
use crate::speech::{
    self, choose_voice, first_transcript, RecognitionEvent, SpeechRecognizer, SpeechSynthesizer,
    Utterance, Voice,
};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::Style;
use ratatui::widgets::ListState;
use std::path::PathBuf;
use std::sync::Arc;
use throbber_widgets_tui::ThrobberState;
use tokio::sync::mpsc;
use tui_textarea::{Input, TextArea};

#[derive(Debug, PartialEq, Clone)]
pub enum Action {
    Render,
    Resize(u16, u16),
    Quit,
    UserInput(KeyEvent),
    Scroll(i16),
    SwitchMode(Mode),
    DismissAlert,
    // Uploaded-file list
    LoadFiles,
    FilesLoaded(u64, Result<Vec<String>, String>),
    // Chat
    SubmitQuery,
    QueryFinished(Result<Option<String>, String>),
    // Pending files and upload
    SelectFiles(Vec<PathBuf>),
    RemoveFile(usize),
    Upload,
    UploadFinished(Result<Option<String>, String>),
    // Download
    SelectDownloadTarget(String),
    Download,
    DownloadFinished(Result<PathBuf, String>),
    // Voice
    ToggleTts,
    LoadVoices,
    VoicesLoaded(Result<Vec<Voice>, String>),
    StartListening,
    Recognition(RecognitionEvent),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Mode {
    Insert,
    Normal,
    FileInput,
    PendingFiles,
    UploadedFiles,
}

pub struct App<'a> {
    pub gateway: Gateway,
    pub action_tx: mpsc::UnboundedSender<Action>,
    pub session: Session,
    pub input: TextArea<'a>,
    pub file_input: TextArea<'a>,
    pub mode: Mode,
    pub alert: Option<String>,
    pub status: Option<String>,
    pub show_help: bool,
    pub vertical_scroll: u16,
    pub auto_scroll: bool,
    pub spinner_state: ThrobberState,
    pub pending_list_state: ListState,
    pub uploaded_list_state: ListState,
    pub download_dir: PathBuf,
    pub lang: String,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    // None until the synthesizer has reported at least one voice.
    voices: Option<Vec<Voice>>,
    voices_requested: bool,
    deferred_speech: Option<String>,
}

fn message_input<'a>() -> TextArea<'a> {
    let mut textarea = TextArea::default();
    textarea.set_cursor_line_style(Style::default());
    textarea.set_placeholder_text("Type your message...");
    textarea
}

fn path_input<'a>() -> TextArea<'a> {
    let mut textarea = TextArea::default();
    textarea.set_cursor_line_style(Style::default());
    textarea.set_placeholder_text("/path/to/file.pdf \"another file.docx\"");
    textarea
}

/// Splits a line of paths on whitespace. Single or double quotes keep a
/// path with spaces together.
pub fn parse_paths(line: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    paths.push(PathBuf::from(std::mem::take(&mut current)));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        paths.push(PathBuf::from(current));
    }
    paths
}

impl<'a> App<'a> {
    pub fn new(action_tx: mpsc::UnboundedSender<Action>, config: &Config) -> Self {
        let (synthesizer, recognizer) = speech::from_config(&config.speech);
        Self {
            gateway: Gateway::new(config.api_base_url.clone()),
            action_tx,
            session: Session::new(config.tts_enabled),
            input: message_input(),
            file_input: path_input(),
            mode: Mode::Insert,
            alert: None,
            status: None,
            show_help: false,
            vertical_scroll: 0,
            auto_scroll: true,
            spinner_state: ThrobberState::default(),
            pending_list_state: ListState::default(),
            uploaded_list_state: ListState::default(),
            download_dir: config.download_dir(),
            lang: config.speech.lang.clone(),
            synthesizer,
            recognizer,
            voices: None,
            voices_requested: false,
            deferred_speech: None,
        }
    }

    pub fn with_speech(
        mut self,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        self.synthesizer = synthesizer;
        self.recognizer = recognizer;
        self.voices = None;
        self.voices_requested = false;
        self.deferred_speech = None;
        self
    }

    pub fn busy(&self) -> bool {
        self.session.loading() || self.session.uploading() || self.session.listening
    }

    pub fn input_text(&self) -> String {
        self.input.lines().join("\n")
    }

    fn set_input(&mut self, text: &str) {
        self.input = message_input();
        self.input.insert_str(text);
    }

    fn alert(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Alert: {}", message);
        self.alert = Some(message);
    }

    fn scroll_to_bottom(&mut self) {
        self.auto_scroll = true;
    }

    fn load_files(&mut self) {
        let request_id = self.session.request_file_list();
        let gateway = self.gateway.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway.list_files().await.map_err(|e| e.to_string());
            let _ = tx.send(Action::FilesLoaded(request_id, outcome));
        });
    }

    fn submit_query(&mut self) -> bool {
        let text = self.input_text();
        let Some(query) = self.session.begin_query(&text) else {
            return false;
        };
        self.input = message_input();
        self.scroll_to_bottom();

        let gateway = self.gateway.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway
                .query(&query)
                .await
                .map(|response| response.answer)
                .map_err(|e| e.to_string());
            let _ = tx.send(Action::QueryFinished(outcome));
        });
        true
    }

    fn select_files(&mut self, paths: Vec<PathBuf>) {
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            self.alert(format!("File not found: {}", missing.display()));
            return;
        }
        if let Err(rejection) = self.session.select_files(paths) {
            self.alert(rejection.to_string());
        }
    }

    fn upload(&mut self) {
        let files = match self.session.begin_upload() {
            Ok(files) => files,
            Err(Rejection::UploadInProgress) => {
                tracing::info!("Upload requested while another is in flight");
                return;
            }
            Err(rejection) => {
                self.alert(rejection.to_string());
                return;
            }
        };

        let gateway = self.gateway.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let outcome = gateway
                .upload(&files)
                .await
                .map(|response| response.message)
                .map_err(|e| e.to_string());
            let _ = tx.send(Action::UploadFinished(outcome));
        });
    }

    fn download(&mut self) {
        let name = match self.session.download_target() {
            Ok(name) => name,
            Err(rejection) => {
                self.alert(rejection.to_string());
                return;
            }
        };

        let gateway = self.gateway.clone();
        let dir = self.download_dir.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let outcome = async {
                let data = gateway.download(&name).await?;
                save_download(&dir, &name, &data).await
            }
            .await
            .map_err(|e| format!("{:#}", e));
            let _ = tx.send(Action::DownloadFinished(outcome));
        });
    }

    fn load_voices(&mut self) {
        let Some(synth) = self.synthesizer.clone() else {
            return;
        };
        if self.voices_requested {
            return;
        }
        self.voices_requested = true;
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            let outcome = synth.voices().await.map_err(|e| e.to_string());
            let _ = tx.send(Action::VoicesLoaded(outcome));
        });
    }

    pub fn speak_if_enabled(&mut self, text: &str) {
        if !self.session.tts_enabled || text.is_empty() {
            return;
        }
        let Some(synth) = self.synthesizer.clone() else {
            return;
        };
        let Some(voices) = self.voices.as_ref() else {
            // Spoken once the voice list arrives. A newer reply replaces it.
            self.deferred_speech = Some(text.to_string());
            self.load_voices();
            return;
        };

        synth.speak(Utterance {
            text: text.to_string(),
            lang: self.lang.clone(),
            voice: choose_voice(voices, &self.lang).cloned(),
        });
    }

    fn start_listening(&mut self) {
        let Some(recognizer) = self.recognizer.clone() else {
            tracing::info!("Speech recognition is not available");
            return;
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        recognizer.start(&self.lang, events_tx);

        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if tx.send(Action::Recognition(event)).is_err() {
                    break;
                }
            }
        });
    }

    fn on_recognition(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => self.session.listening = true,
            RecognitionEvent::Ended => self.session.listening = false,
            RecognitionEvent::Result(results) => {
                if let Some(transcript) = first_transcript(&results) {
                    let transcript = transcript.to_string();
                    self.set_input(&transcript);
                }
            }
            RecognitionEvent::Error(e) => tracing::error!("Speech recognition error: {}", e),
        }
    }

    pub async fn update(&mut self, action: Action) -> bool {
        match action {
            Action::Render | Action::Resize(_, _) | Action::Quit => true,
            Action::SwitchMode(mode) => {
                self.mode = mode;
                true
            }
            Action::DismissAlert => {
                self.alert = None;
                true
            }
            Action::Scroll(delta) => {
                if delta > 0 {
                    self.vertical_scroll = self.vertical_scroll.saturating_add(delta as u16);
                } else {
                    self.vertical_scroll = self.vertical_scroll.saturating_sub(delta.unsigned_abs());
                }
                self.auto_scroll = false;
                true
            }
            Action::LoadFiles => {
                self.load_files();
                false
            }
            Action::FilesLoaded(request_id, outcome) => {
                let changed = self.session.apply_file_list(request_id, outcome);
                if changed {
                    let len = self.session.uploaded_files().len();
                    match self.uploaded_list_state.selected() {
                        Some(i) if i >= len => self.uploaded_list_state.select(len.checked_sub(1)),
                        _ => {}
                    }
                }
                changed
            }
            Action::SubmitQuery => self.submit_query(),
            Action::QueryFinished(outcome) => {
                let reply = self.session.finish_query(outcome);
                self.speak_if_enabled(&reply);
                self.scroll_to_bottom();
                true
            }
            Action::SelectFiles(paths) => {
                self.select_files(paths);
                true
            }
            Action::RemoveFile(index) => {
                self.session.remove_file(index);
                let len = self.session.pending_files().len();
                if let Some(i) = self.pending_list_state.selected() {
                    if i >= len {
                        self.pending_list_state.select(len.checked_sub(1));
                    }
                }
                true
            }
            Action::Upload => {
                self.upload();
                true
            }
            Action::UploadFinished(outcome) => {
                if self.session.finish_upload(outcome) {
                    self.load_files();
                }
                self.scroll_to_bottom();
                true
            }
            Action::SelectDownloadTarget(name) => {
                self.session.select_download_target(name);
                true
            }
            Action::Download => {
                self.download();
                true
            }
            Action::DownloadFinished(outcome) => {
                match outcome {
                    Ok(path) => {
                        tracing::info!("Saved download to {}", path.display());
                        self.status = Some(format!("Saved {}", path.display()));
                    }
                    Err(e) => {
                        tracing::error!("Error downloading file: {}", e);
                        self.alert(DOWNLOAD_FAILED);
                    }
                }
                true
            }
            Action::ToggleTts => {
                self.session.toggle_tts();
                true
            }
            Action::LoadVoices => {
                self.load_voices();
                false
            }
            Action::VoicesLoaded(outcome) => {
                self.voices_requested = false;
                match outcome {
                    // The engine has nothing to offer yet; keep waiting.
                    Ok(voices) if voices.is_empty() => {
                        tracing::debug!("Synthesizer reported no voices yet");
                        return false;
                    }
                    Ok(voices) => self.voices = Some(voices),
                    Err(e) => {
                        // Fall back to the engine default instead of waiting forever.
                        tracing::error!("Could not list voices: {}", e);
                        self.voices = Some(Vec::new());
                    }
                }
                if let Some(text) = self.deferred_speech.take() {
                    self.speak_if_enabled(&text);
                }
                false
            }
            Action::StartListening => {
                self.start_listening();
                true
            }
            Action::Recognition(event) => {
                self.on_recognition(event);
                true
            }
            Action::UserInput(key) => self.handle_key(key),
        }
    }

    fn send(&self, action: Action) {
        let _ = self.action_tx.send(action);
    }

    /// Ctrl shortcuts available from both Insert and Normal mode.
    fn handle_shortcut(&mut self, key: &KeyEvent) -> bool {
        if !key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        match key.code {
            KeyCode::Char('t') => self.send(Action::ToggleTts),
            KeyCode::Char('g') => self.send(Action::StartListening),
            KeyCode::Char('f') => {
                self.file_input = path_input();
                self.send(Action::SwitchMode(Mode::FileInput));
            }
            KeyCode::Char('p') => {
                if self.pending_list_state.selected().is_none()
                    && !self.session.pending_files().is_empty()
                {
                    self.pending_list_state.select(Some(0));
                }
                self.send(Action::SwitchMode(Mode::PendingFiles));
            }
            KeyCode::Char('u') => self.send(Action::Upload),
            KeyCode::Char('d') => {
                let selected = self
                    .session
                    .selected_file()
                    .and_then(|name| self.session.uploaded_files().iter().position(|f| f == name));
                let fallback = (!self.session.uploaded_files().is_empty()).then_some(0);
                self.uploaded_list_state.select(selected.or(fallback));
                self.send(Action::SwitchMode(Mode::UploadedFiles));
            }
            _ => return false,
        }
        true
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.send(Action::Quit);
            return true;
        }

        if self.alert.is_some() {
            self.send(Action::DismissAlert);
            return true;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::F(1)) {
                self.show_help = false;
            }
            return true;
        }

        match self.mode {
            Mode::Insert => {
                if self.handle_shortcut(&key) {
                    return true;
                }
                match key.code {
                    KeyCode::Esc => self.send(Action::SwitchMode(Mode::Normal)),
                    KeyCode::F(1) => self.show_help = true,
                    KeyCode::PageUp => self.send(Action::Scroll(-5)),
                    KeyCode::PageDown => self.send(Action::Scroll(5)),
                    KeyCode::Enter if !key.modifiers.contains(KeyModifiers::SHIFT) => {
                        self.send(Action::SubmitQuery)
                    }
                    _ => {
                        self.input.input(Input::from(key));
                    }
                }
            }
            Mode::Normal => {
                if self.handle_shortcut(&key) {
                    return true;
                }
                match key.code {
                    KeyCode::Char('i') | KeyCode::Enter => {
                        self.send(Action::SwitchMode(Mode::Insert))
                    }
                    KeyCode::Char('q') => self.send(Action::Quit),
                    KeyCode::Char('j') | KeyCode::Down => self.send(Action::Scroll(1)),
                    KeyCode::Char('k') | KeyCode::Up => self.send(Action::Scroll(-1)),
                    KeyCode::PageUp => self.send(Action::Scroll(-10)),
                    KeyCode::PageDown => self.send(Action::Scroll(10)),
                    KeyCode::F(1) => self.show_help = true,
                    _ => {}
                }
            }
            Mode::FileInput => match key.code {
                KeyCode::Esc => self.send(Action::SwitchMode(Mode::Insert)),
                KeyCode::Enter => {
                    let paths = parse_paths(&self.file_input.lines().join(" "));
                    self.send(Action::SelectFiles(paths));
                    self.send(Action::SwitchMode(Mode::Insert));
                }
                _ => {
                    self.file_input.input(Input::from(key));
                }
            },
            Mode::PendingFiles => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => self.send(Action::SwitchMode(Mode::Insert)),
                KeyCode::Down | KeyCode::Char('j') => {
                    let len = self.session.pending_files().len();
                    if let Some(i) = self.pending_list_state.selected() {
                        if i + 1 < len {
                            self.pending_list_state.select(Some(i + 1));
                        }
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if let Some(i) = self.pending_list_state.selected() {
                        self.pending_list_state.select(Some(i.saturating_sub(1)));
                    }
                }
                KeyCode::Char('d') | KeyCode::Delete => {
                    if let Some(i) = self.pending_list_state.selected() {
                        self.send(Action::RemoveFile(i));
                    }
                }
                KeyCode::Char('u') => self.send(Action::Upload),
                _ => {}
            },
            Mode::UploadedFiles => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => self.send(Action::SwitchMode(Mode::Insert)),
                KeyCode::Down | KeyCode::Char('j') => {
                    let len = self.session.uploaded_files().len();
                    if let Some(i) = self.uploaded_list_state.selected() {
                        if i + 1 < len {
                            self.uploaded_list_state.select(Some(i + 1));
                        }
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if let Some(i) = self.uploaded_list_state.selected() {
                        self.uploaded_list_state.select(Some(i.saturating_sub(1)));
                    }
                }
                KeyCode::Enter => {
                    if let Some(name) = self
                        .uploaded_list_state
                        .selected()
                        .and_then(|i| self.session.uploaded_files().get(i))
                    {
                        self.send(Action::SelectDownloadTarget(name.clone()));
                    }
                }
                KeyCode::Char('s') => self.send(Action::Download),
                KeyCode::Char('r') => self.send(Action::LoadFiles),
                _ => {}
            },
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Message, QUERY_FAILED};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSynth {
        voices: Vec<Voice>,
        spoken: Mutex<Vec<Utterance>>,
    }

    #[async_trait::async_trait]
    impl SpeechSynthesizer for RecordingSynth {
        async fn voices(&self) -> anyhow::Result<Vec<Voice>> {
            Ok(self.voices.clone())
        }

        fn speak(&self, utterance: Utterance) {
            self.spoken.lock().unwrap().push(utterance);
        }
    }

    struct ScriptedRecognizer(Vec<RecognitionEvent>);

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(&self, _lang: &str, events: mpsc::UnboundedSender<RecognitionEvent>) {
            for event in &self.0 {
                let _ = events.send(event.clone());
            }
        }
    }

    fn config(base_url: &str) -> Config {
        Config {
            api_base_url: base_url.to_string(),
            ..Config::default()
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::empty())
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Feeds queued actions back into the app until `done` holds.
    async fn run_until(
        app: &mut App<'_>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
        done: impl Fn(&App) -> bool,
    ) {
        while !done(app) {
            let action = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for action")
                .expect("channel closed");
            app.update(action).await;
        }
    }

    #[tokio::test]
    async fn test_submit_query_round_trip() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "answer": "Hello!" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config(&mock_server.uri()));
        app.set_input("hi");

        app.update(Action::SubmitQuery).await;
        assert!(app.session.loading());
        assert!(app.input_text().is_empty());

        run_until(&mut app, &mut rx, |app| !app.session.loading()).await;
        assert_eq!(
            app.session.messages(),
            &[Message::user("hi"), Message::bot("Hello!")]
        );
    }

    #[tokio::test]
    async fn test_blank_input_sends_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config(&mock_server.uri()));
        app.set_input("   ");

        assert!(!app.update(Action::SubmitQuery).await);
        assert!(app.session.messages().is_empty());
        assert!(!app.session.loading());
    }

    #[tokio::test]
    async fn test_enter_in_insert_mode_submits() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));

        app.update(Action::UserInput(key(KeyCode::Enter))).await;
        assert_eq!(rx.recv().await, Some(Action::SubmitQuery));
    }

    #[tokio::test]
    async fn test_failed_query_is_spoken_when_tts_enabled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(RecordingSynth {
            voices: vec![
                Voice { name: "Deutsch".into(), lang: "de".into() },
                Voice { name: "US".into(), lang: "en-US".into() },
            ],
            ..RecordingSynth::default()
        });
        let mut app = App::new(tx, &config("http://127.0.0.1:9"))
            .with_speech(Some(synth.clone()), None);
        app.session.tts_enabled = true;

        app.update(Action::LoadVoices).await;
        run_until(&mut app, &mut rx, |app| app.voices.is_some()).await;

        app.set_input("hi");
        app.update(Action::SubmitQuery).await;
        run_until(&mut app, &mut rx, |app| !app.session.loading()).await;

        assert_eq!(app.session.messages()[1], Message::bot(QUERY_FAILED));
        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, QUERY_FAILED);
        assert_eq!(spoken[0].voice.as_ref().map(|v| v.name.as_str()), Some("US"));
    }

    #[tokio::test]
    async fn test_speech_waits_for_voices() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let synth = Arc::new(RecordingSynth::default());
        let mut app = App::new(tx, &config("http://127.0.0.1:9"))
            .with_speech(Some(synth.clone()), None);
        app.session.tts_enabled = true;

        app.speak_if_enabled("first");
        app.speak_if_enabled("second");
        assert!(synth.spoken.lock().unwrap().is_empty());

        app.update(Action::VoicesLoaded(Ok(vec![Voice {
            name: "Only".into(),
            lang: "fr".into(),
        }])))
        .await;

        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "second");
        assert_eq!(spoken[0].lang, "en-US");
        assert_eq!(spoken[0].voice.as_ref().unwrap().name, "Only");
    }

    #[tokio::test]
    async fn test_speech_skipped_when_disabled_or_blank() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let synth = Arc::new(RecordingSynth::default());
        let mut app = App::new(tx, &config("http://127.0.0.1:9"))
            .with_speech(Some(synth.clone()), None);
        app.update(Action::VoicesLoaded(Err("no engine".into()))).await;

        app.speak_if_enabled("muted");
        app.session.tts_enabled = true;
        app.speak_if_enabled("");
        assert!(synth.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_voice_list_keeps_speech_waiting() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(RecordingSynth::default());
        let mut app = App::new(tx, &config("http://127.0.0.1:9"))
            .with_speech(Some(synth.clone()), None);
        app.session.tts_enabled = true;
        app.update(Action::VoicesLoaded(Ok(Vec::new()))).await;

        app.speak_if_enabled("hello");
        assert!(synth.spoken.lock().unwrap().is_empty());

        // Deferring asks the engine again; it still has nothing.
        let action = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(action, Action::VoicesLoaded(Ok(Vec::new())));
        app.update(action).await;
        assert!(synth.spoken.lock().unwrap().is_empty());

        app.update(Action::VoicesLoaded(Ok(vec![Voice {
            name: "US".into(),
            lang: "en-US".into(),
        }])))
        .await;

        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "hello");
        assert_eq!(spoken[0].voice.as_ref().unwrap().name, "US");
    }

    #[tokio::test]
    async fn test_failed_voice_listing_speaks_with_default_voice() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let synth = Arc::new(RecordingSynth::default());
        let mut app = App::new(tx, &config("http://127.0.0.1:9"))
            .with_speech(Some(synth.clone()), None);
        app.session.tts_enabled = true;

        app.speak_if_enabled("waiting");
        assert!(synth.spoken.lock().unwrap().is_empty());
        app.update(Action::VoicesLoaded(Err("espeak-ng missing".into()))).await;

        let spoken = synth.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].text, "waiting");
        assert_eq!(spoken[0].voice, None);
    }

    #[tokio::test]
    async fn test_listening_replaces_input_with_first_alternative() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recognizer = Arc::new(ScriptedRecognizer(vec![
            RecognitionEvent::Started,
            RecognitionEvent::Result(vec![
                vec!["upload my notes".to_string(), "upload my goats".to_string()],
                vec!["ignored".to_string()],
            ]),
            RecognitionEvent::Ended,
        ]));
        let mut app = App::new(tx, &config("http://127.0.0.1:9")).with_speech(None, Some(recognizer));
        app.set_input("old text");

        app.update(Action::StartListening).await;
        run_until(&mut app, &mut rx, |app| app.session.listening).await;
        run_until(&mut app, &mut rx, |app| !app.session.listening).await;

        assert_eq!(app.input_text(), "upload my notes");
        assert!(app.session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_listening_without_recognizer_is_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));
        app.update(Action::StartListening).await;
        assert!(!app.session.listening);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));
        app.update(Action::SelectFiles(vec![PathBuf::from("/no/such/file.pdf")]))
            .await;
        assert!(app.session.pending_files().is_empty());
        assert!(app.alert.as_deref().unwrap().contains("/no/such/file.pdf"));
    }

    #[tokio::test]
    async fn test_alert_swallows_next_key() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));
        app.update(Action::Upload).await;
        assert_eq!(app.alert.as_deref(), Some("Please select files first!"));

        app.update(Action::UserInput(key(KeyCode::Char('x')))).await;
        assert_eq!(rx.recv().await, Some(Action::DismissAlert));
        app.update(Action::DismissAlert).await;
        assert!(app.alert.is_none());
        assert!(app.input_text().is_empty());
    }

    #[tokio::test]
    async fn test_file_input_mode_parses_paths() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));

        app.update(Action::UserInput(ctrl('f'))).await;
        assert_eq!(rx.recv().await, Some(Action::SwitchMode(Mode::FileInput)));
        app.update(Action::SwitchMode(Mode::FileInput)).await;

        app.file_input.insert_str("/tmp/a.pdf '/tmp/b c.docx'");
        app.update(Action::UserInput(key(KeyCode::Enter))).await;
        assert_eq!(
            rx.recv().await,
            Some(Action::SelectFiles(vec![
                PathBuf::from("/tmp/a.pdf"),
                PathBuf::from("/tmp/b c.docx")
            ]))
        );
        assert_eq!(rx.recv().await, Some(Action::SwitchMode(Mode::Insert)));
    }

    #[tokio::test]
    async fn test_uploaded_picker_selects_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));
        let id = app.session.request_file_list();
        app.update(Action::FilesLoaded(id, Ok(vec!["a.pdf".into(), "b.pdf".into()])))
            .await;

        app.update(Action::UserInput(ctrl('d'))).await;
        assert_eq!(rx.recv().await, Some(Action::SwitchMode(Mode::UploadedFiles)));
        app.update(Action::SwitchMode(Mode::UploadedFiles)).await;

        app.update(Action::UserInput(key(KeyCode::Down))).await;
        app.update(Action::UserInput(key(KeyCode::Enter))).await;
        let action = rx.recv().await.unwrap();
        assert_eq!(action, Action::SelectDownloadTarget("b.pdf".to_string()));
        app.update(action).await;
        assert_eq!(app.session.selected_file(), Some("b.pdf"));
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_any_mode() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, &config("http://127.0.0.1:9"));
        app.mode = Mode::PendingFiles;
        app.update(Action::UserInput(ctrl('c'))).await;
        assert_eq!(rx.recv().await, Some(Action::Quit));
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(
            parse_paths(r#"  a.pdf "my file.docx"  'x y.png' b"#),
            vec![
                PathBuf::from("a.pdf"),
                PathBuf::from("my file.docx"),
                PathBuf::from("x y.png"),
                PathBuf::from("b"),
            ]
        );
        assert!(parse_paths("   ").is_empty());
    }
}
