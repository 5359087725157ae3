//! Rolling session memory - context for LLM decisions.
//!
//! Bounded deque of typed entries; oldest entries are evicted once the
//! configured cap is reached. `build_context` renders the recent tail as
//! a JSON array with relative timestamps.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::action::{ActionKind, MixAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// we changed something
    ActionTaken,
    /// the approval queue rejected it
    ActionRejected,
    /// LLM noted something
    Observation,
    /// engineer manually changed something
    EngineerOverride,
    /// engineer typed a chat instruction
    EngineerInstruction,
    /// periodic mix state dump
    MixSnapshot,
}

#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub timestamp: Instant,
    pub kind: MemoryKind,
    pub action: Option<MixAction>,
    pub mix_state: Option<Value>,
    pub note: String,
}

pub struct SessionMemory {
    entries: RwLock<VecDeque<MemoryEntry>>,
    max_entries: usize,
}

impl SessionMemory {
    pub fn new(max_entries: usize) -> Self {
        Self { entries: RwLock::new(VecDeque::new()), max_entries }
    }

    fn push(&self, entry: MemoryEntry) {
        let mut entries = self.entries.write();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub fn record_action(&self, action: &MixAction, context: Value) {
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::ActionTaken,
            note: action.describe(),
            action: Some(action.clone()),
            mix_state: Some(context),
        });
    }

    pub fn record_rejection(&self, action: &MixAction, reason: &str) {
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::ActionRejected,
            note: format!("Rejected: {}", reason),
            action: Some(action.clone()),
            mix_state: None,
        });
    }

    pub fn record_observation(&self, note: &str) {
        let mut obs = MixAction { kind: ActionKind::Observation, ..MixAction::default() };
        obs.reason = note.to_string();
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::Observation,
            note: note.to_string(),
            action: Some(obs),
            mix_state: None,
        });
    }

    pub fn record_engineer_override(&self, channel: u16, what: &str) {
        let action = MixAction { channel, reason: what.to_string(), ..MixAction::default() };
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::EngineerOverride,
            note: format!("Engineer override ch{}: {}", channel, what),
            action: Some(action),
            mix_state: None,
        });
    }

    pub fn record_instruction(&self, instruction: &str) {
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::EngineerInstruction,
            note: instruction.to_string(),
            action: None,
            mix_state: None,
        });
    }

    pub fn record_snapshot(&self, mix_state: Value) {
        self.push(MemoryEntry {
            timestamp: Instant::now(),
            kind: MemoryKind::MixSnapshot,
            note: "Mix snapshot".into(),
            action: None,
            mix_state: Some(mix_state),
        });
    }

    /// Most recent standing instructions, oldest first.
    pub fn active_instructions(&self, max_count: usize) -> Vec<String> {
        let entries = self.entries.read();
        let mut result: Vec<String> = entries
            .iter()
            .rev()
            .filter(|e| e.kind == MemoryKind::EngineerInstruction)
            .take(max_count)
            .map(|e| e.note.clone())
            .collect();
        result.reverse();
        result
    }

    /// Chronological slice of the last `max_recent` entries, rendered for
    /// the LLM prompt.
    pub fn build_context(&self, max_recent: usize) -> Value {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(max_recent);

        let now = Instant::now();
        let mut ctx = Vec::with_capacity(entries.len() - start);
        for e in entries.iter().skip(start) {
            let mut obj = serde_json::Map::new();
            obj.insert(
                "seconds_ago".into(),
                json!(now.duration_since(e.timestamp).as_secs()),
            );
            obj.insert("note".into(), json!(e.note));
            match e.kind {
                MemoryKind::ActionTaken => {
                    obj.insert("type".into(), json!("action_taken"));
                    if let Some(a) = &e.action {
                        obj.insert("action".into(), a.to_json());
                    }
                }
                MemoryKind::ActionRejected => {
                    obj.insert("type".into(), json!("action_rejected"));
                    if let Some(a) = &e.action {
                        obj.insert("action".into(), a.to_json());
                    }
                }
                MemoryKind::Observation => {
                    obj.insert("type".into(), json!("observation"));
                }
                MemoryKind::EngineerOverride => {
                    obj.insert("type".into(), json!("engineer_override"));
                    if let Some(a) = &e.action {
                        obj.insert("channel".into(), json!(a.channel));
                    }
                }
                MemoryKind::EngineerInstruction => {
                    obj.insert("type".into(), json!("engineer_instruction"));
                    obj.insert("instruction".into(), json!(e.note));
                }
                MemoryKind::MixSnapshot => {
                    obj.insert("type".into(), json!("snapshot"));
                }
            }
            ctx.push(Value::Object(obj));
        }
        Value::Array(ctx)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_evicts_oldest() {
        let memory = SessionMemory::new(5);
        for i in 0..20 {
            memory.record_observation(&format!("note {}", i));
        }
        assert_eq!(memory.len(), 5);

        let ctx = memory.build_context(100);
        let notes: Vec<&str> = ctx
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["note"].as_str().unwrap())
            .collect();
        assert_eq!(notes, vec!["note 15", "note 16", "note 17", "note 18", "note 19"]);
    }

    #[test]
    fn test_build_context_limits_and_orders() {
        let memory = SessionMemory::new(100);
        for i in 0..10 {
            memory.record_observation(&format!("obs {}", i));
        }
        let ctx = memory.build_context(3);
        let arr = ctx.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[0]["note"], "obs 7");
        assert_eq!(arr[2]["note"], "obs 9");
        assert!(arr[0]["seconds_ago"].is_u64());
    }

    #[test]
    fn test_entry_types_tagged() {
        let memory = SessionMemory::new(100);
        let action = MixAction { kind: ActionKind::SetFader, channel: 2, value: 0.5, ..MixAction::default() };
        memory.record_action(&action, json!({}));
        memory.record_rejection(&action, "too large");
        memory.record_observation("quiet verse");
        memory.record_engineer_override(4, "fader move");
        memory.record_instruction("leave drums alone");
        memory.record_snapshot(json!({"ch": []}));

        let ctx = memory.build_context(10);
        let types: Vec<&str> = ctx
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec![
                "action_taken",
                "action_rejected",
                "observation",
                "engineer_override",
                "engineer_instruction",
                "snapshot"
            ]
        );
    }

    #[test]
    fn test_active_instructions_chronological() {
        let memory = SessionMemory::new(100);
        memory.record_instruction("first");
        memory.record_observation("noise");
        memory.record_instruction("second");
        memory.record_instruction("third");

        assert_eq!(memory.active_instructions(2), vec!["second", "third"]);
        assert_eq!(memory.active_instructions(10), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_rejection_note() {
        let memory = SessionMemory::new(10);
        let action = MixAction::default();
        memory.record_rejection(&action, "engineer said no");
        let ctx = memory.build_context(1);
        assert_eq!(ctx[0]["note"], "Rejected: engineer said no");
    }
}
