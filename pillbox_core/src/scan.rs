//! Medicine label scanning.
//!
//! The extractor is an external program (typically a wrapper around a vision
//! model) that receives an image path and prints its best guess as JSON. Its
//! output is never trusted beyond picking out `name`, `dosage` and
//! `instructions`; any failure degrades to an empty guess with a message so
//! the user can fall back to manual entry.

use crate::medications::MedicationInput;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

pub const PROCESS_FAILED: &str = "Could not process image. Please enter details manually.";
pub const NOTHING_EXTRACTED: &str = "Could not extract medication info";

/// Best-effort guess extracted from a label
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelGuess {
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LabelGuess {
    fn failed(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Prefill a medication form; validation still applies on save
    pub fn into_input(self, schedules: Vec<String>) -> MedicationInput {
        MedicationInput {
            name: self.name,
            dosage: Some(self.dosage),
            instructions: Some(self.instructions),
            schedules,
        }
    }
}

/// Something that turns a label image into raw response text
pub trait LabelExtractor {
    fn extract(&self, image: &Path) -> Result<String>;
}

/// Runs an external program with the image path as its last argument
#[derive(Clone, Debug)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
}

impl CommandExtractor {
    /// Build from an argv list; `None` when the list is empty
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl LabelExtractor for CommandExtractor {
    fn extract(&self, image: &Path) -> Result<String> {
        tracing::debug!("Running extractor {} on {:?}", self.program, image);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .output()
            .map_err(|e| Error::Extractor(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::Extractor(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reject a missing or empty image before calling the extractor
pub fn check_image(image: &Path) -> Result<()> {
    let has_content = std::fs::metadata(image)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    if has_content {
        Ok(())
    } else {
        Err(Error::field("image", "Please capture an image"))
    }
}

/// Extract the first flat `{ ... }` block from a chatty response
fn first_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let len = content[start..].find('}')?;
    Some(&content[start..=start + len])
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Parse extractor output into a guess; never fails
pub fn parse_label_response(content: &str) -> LabelGuess {
    let Some(block) = first_json_object(content) else {
        tracing::warn!("No JSON object in extractor response");
        return LabelGuess::failed(NOTHING_EXTRACTED);
    };

    match serde_json::from_str::<serde_json::Value>(block) {
        Ok(value) => LabelGuess {
            name: string_field(&value, "name"),
            dosage: string_field(&value, "dosage"),
            instructions: string_field(&value, "instructions"),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Failed to parse extractor response: {}", e);
            LabelGuess::failed(NOTHING_EXTRACTED)
        }
    }
}

/// One best-effort extraction attempt
pub fn scan_label(extractor: &dyn LabelExtractor, image: &Path) -> LabelGuess {
    match extractor.extract(image) {
        Ok(content) => parse_label_response(&content),
        Err(e) => {
            tracing::error!("Medicine scan error: {}", e);
            LabelGuess::failed(PROCESS_FAILED)
        }
    }
}
