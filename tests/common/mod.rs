#![allow(dead_code)]

use async_trait::async_trait;
use dmt::cluster::{Cluster, Member, Row};
use dmt::error::{AppError, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// In-memory cluster holding one migration's status record.
///
/// `script` holds records the cluster moves through: each status query first
/// advances to the next scripted record, the last one sticks.
pub struct FakeCluster {
    /// `None` answers for any migration id.
    migration_id: Option<String>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    record: Option<Value>,
    script: VecDeque<Option<Value>>,
    members: Vec<Member>,
    lists: HashMap<String, Vec<String>>,
    offers: Vec<(String, Value)>,
    queries: Vec<String>,
    fail_progress: bool,
    fail_lists: bool,
    hang_lists: bool,
}

impl FakeCluster {
    pub fn new(migration_id: &str) -> Self {
        let state = State {
            members: vec![Member {
                uuid: "member-1".to_string(),
                address: "127.0.0.1:5701".to_string(),
            }],
            ..State::default()
        };
        Self {
            migration_id: Some(migration_id.to_string()),
            state: Mutex::new(state),
        }
    }

    /// For flows that generate their own migration id.
    pub fn any_migration() -> Self {
        Self {
            migration_id: None,
            ..Self::new("")
        }
    }

    pub fn with_record(self, record: Value) -> Self {
        self.state.lock().unwrap().record = Some(record);
        self
    }

    pub fn with_script(self, script: Vec<Option<Value>>) -> Self {
        self.state.lock().unwrap().script = script.into();
        self
    }

    pub fn with_list(self, name: &str, lines: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(name.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_members(self, members: Vec<Member>) -> Self {
        self.state.lock().unwrap().members = members;
        self
    }

    pub fn failing_progress(self) -> Self {
        self.state.lock().unwrap().fail_progress = true;
        self
    }

    pub fn failing_lists(self) -> Self {
        self.state.lock().unwrap().fail_lists = true;
        self
    }

    /// Reading a member's log list never completes.
    pub fn hanging_lists(self) -> Self {
        self.state.lock().unwrap().hang_lists = true;
        self
    }

    pub fn set_record(&self, record: Value) {
        self.state.lock().unwrap().record = Some(record);
    }

    pub fn offers(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().offers.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn query(&self, statement: &str) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(statement.to_string());

        if statement.contains("'$.status'") {
            if let Some(next) = state.script.pop_front() {
                state.record = next;
            }
        }
        if state.fail_progress && statement.contains("'$.remainingTime'") {
            return Err(AppError::Remote("progress unavailable".to_string()));
        }
        if let Some(id) = &self.migration_id {
            if key_of(statement) != Some(id.as_str()) {
                return Ok(Vec::new());
            }
        }
        let Some(record) = state.record.as_ref() else {
            return Ok(Vec::new());
        };

        let columns = columns_of(statement);
        if columns.trim() == "this" {
            return Ok(vec![vec![record.clone()]]);
        }
        let row = json_paths(columns)
            .into_iter()
            .map(|path| resolve(record, &path))
            .collect();
        Ok(vec![row])
    }

    async fn members(&self) -> Result<Vec<Member>> {
        Ok(self.state.lock().unwrap().members.clone())
    }

    async fn list(&self, name: &str) -> Result<Vec<String>> {
        let (hang, fail, lines) = {
            let state = self.state.lock().unwrap();
            let lines = state.lists.get(name).cloned().unwrap_or_default();
            (state.hang_lists, state.fail_lists, lines)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(AppError::Remote(format!("list {} unavailable", name)));
        }
        Ok(lines)
    }

    async fn offer(&self, queue: &str, item: Value) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .offers
            .push((queue.to_string(), item));
        Ok(())
    }
}

fn key_of(statement: &str) -> Option<&str> {
    let start = statement.find("__key='")? + "__key='".len();
    let len = statement[start..].find('\'')?;
    Some(&statement[start..start + len])
}

fn columns_of(statement: &str) -> &str {
    let start = statement.find("SELECT ").map(|i| i + "SELECT ".len()).unwrap_or(0);
    let end = statement.find(" FROM ").unwrap_or(statement.len());
    &statement[start..end]
}

fn json_paths(columns: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = columns;
    while let Some(start) = rest.find("'$.") {
        let after = &rest[start + 3..];
        let Some(end) = after.find('\'') else {
            break;
        };
        paths.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    paths
}

/// Resolves `a.b[2]` style paths; anything missing is null.
fn resolve(record: &Value, path: &str) -> Value {
    let mut current = record;
    for segment in path.split('.') {
        let (name, index) = match segment.find('[') {
            Some(open) => {
                let index = segment[open + 1..segment.len() - 1].parse::<usize>().ok();
                (&segment[..open], index)
            }
            None => (segment, None),
        };
        current = match current.get(name) {
            Some(value) => value,
            None => return Value::Null,
        };
        if let Some(index) = index {
            current = match current.get(index) {
                Some(value) => value,
                None => return Value::Null,
            };
        }
    }
    current.clone()
}

pub fn item(name: &str, ds_type: &str, status: &str) -> Value {
    json!({
        "name": name,
        "type": ds_type,
        "status": status,
        "completionPercentage": 0.0,
        "error": "",
    })
}

pub fn failed_item(name: &str, ds_type: &str, error: &str) -> Value {
    json!({
        "name": name,
        "type": ds_type,
        "status": "FAILED",
        "completionPercentage": 10.0,
        "error": error,
    })
}

pub fn record(status: &str, items: Vec<Value>) -> Value {
    json!({
        "status": status,
        "migrations": items,
        "logs": [],
        "errors": [],
        "warnings": [],
        "report": "",
        "completionPercentage": 50.0,
        "remainingTime": 90000,
    })
}

pub fn with_field(mut record: Value, field: &str, value: Value) -> Value {
    record[field] = value;
    record
}
