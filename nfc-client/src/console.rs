//! Line console: command parsing and event rendering

use crate::orchestrator::{Command, SessionSnapshot};
use nfc_common::events::CalibrationEvent;
use std::fmt::Write as _;

pub const HELP: &str = "\
Commands:
  add <name>      register a feature
  remove <name>   remove a feature
  record <name>   record a timed sample for a feature
  cancel          abort the running recording
  train           train the model (all features calibrated)
  infer           start or stop live inference
  status          show the session
  remote          ask the Model Service for its status
  help            show this text
  quit            stop and exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Add(String),
    Remove(String),
    Record(String),
    Cancel,
    Train,
    Infer,
    Status,
    Remote,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Orchestrator command for this line, if it maps to one
    pub fn into_command(self) -> Option<Command> {
        match self {
            ConsoleCommand::Add(name) => Some(Command::AddFeature(name)),
            ConsoleCommand::Remove(name) => Some(Command::RemoveFeature(name)),
            ConsoleCommand::Record(name) => Some(Command::StartRecording(name)),
            ConsoleCommand::Cancel => Some(Command::CancelRecording),
            ConsoleCommand::Train => Some(Command::Train),
            ConsoleCommand::Infer => Some(Command::ToggleInference),
            ConsoleCommand::Remote => Some(Command::RefreshStatus),
            ConsoleCommand::Status | ConsoleCommand::Help | ConsoleCommand::Quit => None,
        }
    }
}

/// Parse one input line; `Ok(None)` for a blank line
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let named = |build: fn(String) -> ConsoleCommand| {
        if rest.is_empty() {
            Err(format!("'{}' needs a feature name", verb))
        } else {
            Ok(Some(build(rest.to_string())))
        }
    };

    match verb.to_ascii_lowercase().as_str() {
        "add" => named(ConsoleCommand::Add),
        "remove" | "rm" => named(ConsoleCommand::Remove),
        "record" | "rec" => named(ConsoleCommand::Record),
        "cancel" => Ok(Some(ConsoleCommand::Cancel)),
        "train" => Ok(Some(ConsoleCommand::Train)),
        "infer" | "inference" => Ok(Some(ConsoleCommand::Infer)),
        "status" => Ok(Some(ConsoleCommand::Status)),
        "remote" => Ok(Some(ConsoleCommand::Remote)),
        "help" | "?" => Ok(Some(ConsoleCommand::Help)),
        "quit" | "exit" => Ok(Some(ConsoleCommand::Quit)),
        other => Err(format!("Unknown command '{}' (try 'help')", other)),
    }
}

/// One display line per event; `None` for events not worth showing
pub fn render_event(event: &CalibrationEvent) -> Option<String> {
    let line = match event {
        CalibrationEvent::FeatureAdded { feature, .. } => format!("+ {}", feature),
        CalibrationEvent::FeatureRemoved { feature, .. } => format!("- {}", feature),
        CalibrationEvent::RecordingStarted {
            feature,
            seconds_remaining,
            ..
        } => format!("● recording '{}' ({}s)", feature, seconds_remaining),
        CalibrationEvent::RecordingTick {
            feature,
            seconds_remaining,
            ..
        } => format!("  '{}' {}s", feature, seconds_remaining),
        CalibrationEvent::FeatureCalibrated { feature, .. } => format!("✓ '{}' calibrated", feature),
        CalibrationEvent::RecordingCancelled { feature, .. } => {
            format!("× recording '{}' cancelled", feature)
        }
        CalibrationEvent::TrainingStarted { features, .. } => {
            format!("training on {}...", features.join(", "))
        }
        CalibrationEvent::TrainingCompleted { accuracy, .. } => match accuracy {
            Some(accuracy) => format!("model trained, accuracy {:.1}%", accuracy * 100.0),
            None => "model trained".to_string(),
        },
        CalibrationEvent::TrainingFailed { .. } => return None,
        CalibrationEvent::InferenceStateChanged { new_state, .. } => format!("inference {}", new_state),
        CalibrationEvent::PredictionUpdated { prediction, .. } => format!(
            "→ {} ({:.0}%)",
            prediction.feature,
            prediction.confidence * 100.0
        ),
        CalibrationEvent::ErrorRaised { message, .. } => format!("! {}", message),
        CalibrationEvent::ErrorCleared { .. } => return None,
        CalibrationEvent::ServiceStatusUpdated {
            recording,
            inference,
            model_trained,
            features_recorded,
            ..
        } => format!(
            "service: recording={} inference={} trained={} recorded=[{}]",
            recording,
            inference,
            model_trained,
            features_recorded.join(", ")
        ),
    };
    Some(line)
}

/// Multi-line session summary
pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();

    if snapshot.features.is_empty() {
        out.push_str("features: (none)\n");
    } else {
        out.push_str("features:\n");
        for feature in &snapshot.features {
            let mark = if feature.calibrated { "✓" } else { " " };
            let _ = writeln!(out, "  [{}] {}", mark, feature.name);
        }
    }

    if let Some(recording) = &snapshot.recording {
        let _ = writeln!(
            out,
            "recording: '{}' {}s left",
            recording.feature, recording.seconds_remaining
        );
    } else if let Some(feature) = &snapshot.recording_requested {
        let _ = writeln!(out, "recording: '{}' starting", feature);
    }

    let _ = writeln!(
        out,
        "training: {}{}",
        snapshot.training,
        if snapshot.model_trained { " (model trained)" } else { "" }
    );
    if let Some(accuracy) = snapshot.training_report.as_ref().and_then(|r| r.accuracy) {
        let _ = writeln!(out, "accuracy: {:.1}%", accuracy * 100.0);
    }

    let _ = writeln!(out, "inference: {}", snapshot.inference);
    if let Some(prediction) = &snapshot.last_prediction {
        let _ = writeln!(
            out,
            "prediction: {} ({:.0}%)",
            prediction.feature,
            prediction.confidence * 100.0
        );
    }

    let mut offered = Vec::new();
    if snapshot.can_train {
        offered.push("train");
    }
    if snapshot.can_toggle_inference {
        offered.push("infer");
    }
    if !offered.is_empty() {
        let _ = writeln!(out, "available: {}", offered.join(", "));
    }

    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "error: {}", error);
    }

    out.trim_end().to_string()
}
