//! Voice input and output.
//!
//! Both directions are optional capabilities. When one is not configured the
//! app keeps working and only logs that it is missing.

use crate::config::SpeechConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<Voice>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voices the engine can speak with. An empty list means the engine has
    /// not reported any yet.
    async fn voices(&self) -> Result<Vec<Voice>>;

    /// Queues the utterance and returns immediately.
    fn speak(&self, utterance: Utterance);
}

/// Recognition lifecycle, delivered in order: `Started`, any number of
/// `Result`/`Error`, then `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    /// Results, each holding its alternatives best-first.
    Result(Vec<Vec<String>>),
    Error(String),
    Ended,
}

pub trait SpeechRecognizer: Send + Sync {
    /// Begins a single capture. Events arrive on `events`.
    fn start(&self, lang: &str, events: UnboundedSender<RecognitionEvent>);
}

fn normalize_lang(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Picks the first voice for `lang`, else the first voice at all.
pub fn choose_voice<'a>(voices: &'a [Voice], lang: &str) -> Option<&'a Voice> {
    let wanted = normalize_lang(lang);
    voices
        .iter()
        .find(|v| normalize_lang(&v.lang) == wanted)
        .or_else(|| voices.first())
}

/// Only the top alternative of the first result counts.
pub fn first_transcript(results: &[Vec<String>]) -> Option<&str> {
    results
        .first()
        .and_then(|alternatives| alternatives.first())
        .map(String::as_str)
}

pub fn from_config(
    config: &SpeechConfig,
) -> (
    Option<Arc<dyn SpeechSynthesizer>>,
    Option<Arc<dyn SpeechRecognizer>>,
) {
    let synthesizer = config
        .synthesizer
        .as_ref()
        .filter(|p| !p.trim().is_empty())
        .map(|program| Arc::new(CommandSynthesizer::new(program.clone())) as Arc<dyn SpeechSynthesizer>);

    let recognizer = config
        .recognizer
        .as_ref()
        .and_then(|argv| CommandRecognizer::from_argv(argv))
        .map(|r| Arc::new(r) as Arc<dyn SpeechRecognizer>);

    (synthesizer, recognizer)
}

/// Speaks through an espeak-compatible program (`espeak`, `espeak-ng`).
/// Utterances play one at a time, in the order they were queued.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    queue: UnboundedSender<Utterance>,
}

impl CommandSynthesizer {
    /// Starts the playback worker. Must be called inside a tokio runtime.
    pub fn new(program: String) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Utterance>();
        let worker_program = program.clone();

        tokio::spawn(async move {
            while let Some(utterance) = rx.recv().await {
                Self::play(&worker_program, &utterance).await;
            }
        });

        Self { program, queue }
    }

    async fn play(program: &str, utterance: &Utterance) {
        let status = Command::new(program)
            .args(Self::args_for(utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::error!("{} exited with {}", program, status),
            Err(e) => tracing::error!("Could not run {}: {}", program, e),
        }
    }

    fn args_for(utterance: &Utterance) -> Vec<String> {
        let voice = match &utterance.voice {
            Some(voice) => voice.name.clone(),
            None => normalize_lang(&utterance.lang),
        };
        vec!["-v".to_string(), voice, "--".to_string(), utterance.text.clone()]
    }
}

/// Parses the table printed by `espeak-ng --voices`.
pub fn parse_espeak_voices(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(Voice {
                lang: cols[1].to_string(),
                name: cols[3].to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn voices(&self) -> Result<Vec<Voice>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} --voices exited with {}",
                self.program,
                output.status
            ));
        }

        Ok(parse_espeak_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    fn speak(&self, utterance: Utterance) {
        if self.queue.send(utterance).is_err() {
            tracing::error!("Speech worker for {} has stopped", self.program);
        }
    }
}

/// Runs an external capture command once. Each non-empty stdout line is an
/// alternative for a single result, best first. The locale is passed in
/// `MINDMATE_SPEECH_LANG`.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

pub fn parse_recognizer_output(stdout: &str) -> Vec<Vec<String>> {
    let alternatives: Vec<String> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if alternatives.is_empty() {
        Vec::new()
    } else {
        vec![alternatives]
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(&self, lang: &str, events: UnboundedSender<RecognitionEvent>) {
        let program = self.program.clone();
        let args = self.args.clone();
        let lang = lang.to_string();

        tokio::spawn(async move {
            let _ = events.send(RecognitionEvent::Started);

            let output = Command::new(&program)
                .args(&args)
                .env("MINDMATE_SPEECH_LANG", &lang)
                .stdin(Stdio::null())
                .output()
                .await;

            match output {
                Ok(output) if output.status.success() => {
                    let results = parse_recognizer_output(&String::from_utf8_lossy(&output.stdout));
                    if !results.is_empty() {
                        let _ = events.send(RecognitionEvent::Result(results));
                    }
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let _ = events.send(RecognitionEvent::Error(format!(
                        "{} exited with {}: {}",
                        program,
                        output.status,
                        stderr.trim()
                    )));
                }
                Err(e) => {
                    let _ = events.send(RecognitionEvent::Error(format!(
                        "Could not run {}: {}",
                        program, e
                    )));
                }
            }

            let _ = events.send(RecognitionEvent::Ended);
        });
    }
}
