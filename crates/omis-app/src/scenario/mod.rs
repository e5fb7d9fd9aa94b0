//! Scripted functional runs against a real store.
//!
//! A scenario file is a JSON object mapping scenario names to step lists:
//!
//! ```json
//! {
//!   "delay_after_mail": [
//!     { "action": "add_request", "params": { "request_number": "101", "position_number": "12" } },
//!     { "action": "mail_fake" },
//!     { "action": "notify", "params": { "minutes": 60, "dry_run": true } }
//!   ]
//! }
//! ```
//!
//! Every step of the selected scenario is validated before the first one runs.

use std::collections::BTreeMap;
use std::path::Path;

use omis_core::{CoreError, NewRequest, RequestStatus, RequestStore, UpdateOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::{App, MailOptions, NotifyOptions, RunOptions};

const DEFAULT_COMMENT_AUTHOR: &str = "Tester";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioBook {
    scenarios: BTreeMap<String, Vec<Value>>,
}

impl ScenarioBook {
    pub fn from_json(raw: &str) -> AppResult<Self> {
        let scenarios = serde_json::from_str(raw).map_err(|error| {
            AppError::configuration(format!(
                "scenario file must be a JSON object of step lists: {error}"
            ))
        })?;
        Ok(Self { scenarios })
    }

    /// Sorted scenario names.
    pub fn names(&self) -> Vec<&str> {
        self.scenarios.keys().map(String::as_str).collect()
    }

    /// Parses every step of `name`; any unknown action or malformed parameter
    /// rejects the whole scenario.
    pub fn plan(&self, name: &str) -> AppResult<Vec<ScenarioStep>> {
        let steps = self
            .scenarios
            .get(name)
            .ok_or_else(|| AppError::configuration(format!("scenario '{name}' not found")))?;
        steps
            .iter()
            .enumerate()
            .map(|(index, raw)| ScenarioStep::parse(index + 1, raw))
            .collect()
    }
}

pub fn load_scenarios(path: impl AsRef<Path>) -> AppResult<ScenarioBook> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|error| {
        AppError::configuration(format!(
            "failed to read scenario file '{}': {error}",
            path.display()
        ))
    })?;
    ScenarioBook::from_json(&raw)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStep {
    AddRequest(AddRequestStep),
    MailFake(MailFakeStep),
    Notify(NotifyStep),
    Runner(RunnerStep),
}

impl ScenarioStep {
    pub const SUPPORTED_ACTIONS: [&'static str; 4] = ["add_request", "mail_fake", "notify", "runner"];

    fn parse(index: usize, raw: &Value) -> AppResult<Self> {
        let action = raw
            .get("action")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|action| !action.is_empty())
            .ok_or_else(|| AppError::configuration(format!("step {index}: missing action")))?;
        let params = match raw.get("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(Value::Object(params)) => Value::Object(params.clone()),
            Some(_) => {
                return Err(AppError::configuration(format!(
                    "step {index}: parameters for action '{action}' must be an object"
                )))
            }
        };

        match action {
            "add_request" => parse_params(index, action, params).map(Self::AddRequest),
            "mail_fake" => parse_params(index, action, params).map(Self::MailFake),
            "notify" => parse_params(index, action, params).map(Self::Notify),
            "runner" => parse_params(index, action, params).map(Self::Runner),
            other => Err(AppError::configuration(format!(
                "step {index}: unsupported action '{other}' (expected one of: {})",
                Self::SUPPORTED_ACTIONS.join(", ")
            ))),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::AddRequest(_) => "add_request",
            Self::MailFake(_) => "mail_fake",
            Self::Notify(_) => "notify",
            Self::Runner(_) => "runner",
        }
    }
}

fn parse_params<T: DeserializeOwned>(index: usize, action: &str, params: Value) -> AppResult<T> {
    serde_json::from_value(params).map_err(|error| {
        AppError::configuration(format!("step {index}: invalid parameters for '{action}': {error}"))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddRequestStep {
    #[serde(deserialize_with = "identifier")]
    pub request_number: String,
    #[serde(deserialize_with = "identifier")]
    pub position_number: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "default_comment_author")]
    pub comment_author: String,
    #[serde(default = "default_true")]
    pub allow_existing: bool,
    #[serde(default, deserialize_with = "optional_status")]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub backdate_minutes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailFakeStep {
    #[serde(default = "default_true")]
    pub use_fake: bool,
    #[serde(default)]
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotifyStep {
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RunnerStep {
    #[serde(default)]
    pub fake_mail: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default)]
    pub mail_backend: Option<String>,
    #[serde(default)]
    pub skip_mail: bool,
    #[serde(default)]
    pub skip_notifier: bool,
}

fn default_true() -> bool {
    true
}

fn default_comment_author() -> String {
    DEFAULT_COMMENT_AUTHOR.to_owned()
}

/// Scenario files often write numbers bare; both `101` and `"101"` work.
fn identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Identifier {
        Text(String),
        Number(u64),
    }

    Ok(match Identifier::deserialize(deserializer)? {
        Identifier::Text(text) => text,
        Identifier::Number(number) => number.to_string(),
    })
}

fn optional_status<'de, D>(deserializer: D) -> Result<Option<RequestStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    RequestStatus::from_key(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown status '{raw}'")))
}

impl App {
    /// Runs a planned scenario step by step and returns one line per step.
    /// The first failing step aborts the run.
    pub async fn run_scenario(&self, steps: &[ScenarioStep]) -> AppResult<Vec<String>> {
        let mut outputs = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let number = index + 1;
            tracing::info!(step = number, action = step.action(), "executing scenario step");
            match self.execute_step(step).await {
                Ok(message) => outputs.push(format!("Step {number}: {message}")),
                Err(error) => {
                    tracing::error!(step = number, action = step.action(), %error, "scenario step failed");
                    return Err(error);
                }
            }
        }
        Ok(outputs)
    }

    async fn execute_step(&self, step: &ScenarioStep) -> AppResult<String> {
        match step {
            ScenarioStep::AddRequest(step) => self.execute_add_request(step),
            ScenarioStep::MailFake(step) => {
                let options = MailOptions {
                    fake: step.use_fake,
                    backend: step.backend.clone(),
                };
                let report = self.check_mail(&options).await?;
                if report.lines.is_empty() {
                    return Ok(format!(
                        "Mail checker: no messages processed (backend={})",
                        report.backend
                    ));
                }
                for line in report.summary_lines() {
                    tracing::info!("MAIL: {line}");
                }
                Ok(format!(
                    "Mail checker processed {} message(s)",
                    report.lines.len()
                ))
            }
            ScenarioStep::Notify(step) => {
                let report = self
                    .notify(&NotifyOptions {
                        minutes: step.minutes,
                        dry_run: step.dry_run,
                    })
                    .await?;
                if report.messages.is_empty() {
                    return Ok(format!(
                        "Notifier: no delays (threshold {} minutes)",
                        report.minutes
                    ));
                }
                for message in &report.messages {
                    tracing::info!("NOTIFY: {}", message.replace('\n', " | "));
                }
                Ok(format!(
                    "Notifier prepared {} message(s)",
                    report.messages.len()
                ))
            }
            ScenarioStep::Runner(step) => {
                self.run(&RunOptions {
                    skip_mail: step.skip_mail,
                    skip_notifier: step.skip_notifier,
                    mail: MailOptions {
                        fake: step.fake_mail,
                        backend: step.mail_backend.clone(),
                    },
                    notify: NotifyOptions {
                        minutes: step.minutes,
                        dry_run: step.dry_run,
                    },
                })
                .await?;
                Ok("Runner completed".to_owned())
            }
        }
    }

    fn execute_add_request(&self, step: &AddRequestStep) -> AppResult<String> {
        let mut store = self.open_store()?;
        let mut request = NewRequest::new(&step.request_number, &step.position_number)
            .with_author(&step.comment_author);
        if let Some(comment) = &step.comment {
            request = request.with_comment(comment);
        }
        let request = request.normalized()?;
        let request_number = request.request_number.clone();
        let position_number = request.position_number.clone();
        let label = format!("{request_number}/{position_number}");

        let created = match store.add(request) {
            Ok(_) => true,
            Err(CoreError::DuplicateRequest { .. }) if step.allow_existing => {
                tracing::info!(
                    request_number = request_number.as_str(),
                    position_number = position_number.as_str(),
                    "request already exists; skipping creation"
                );
                false
            }
            Err(error) => return Err(error.into()),
        };

        if let Some(status) = step.status {
            let outcome = store.update_status(&request_number, &position_number, status)?;
            require_found(outcome, &label, "set status")?;
        }
        if let Some(minutes) = step.backdate_minutes.filter(|minutes| *minutes > 0) {
            let outcome = store.backdate(&request_number, &position_number, minutes)?;
            require_found(outcome, &label, "backdate")?;
        }

        Ok(if created {
            format!("Added request {label}")
        } else {
            format!("Request {label} already existed")
        })
    }
}

fn require_found(outcome: UpdateOutcome, label: &str, action: &str) -> AppResult<()> {
    if outcome.found() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("cannot {action}: request {label} not found")).into())
    }
}
