//! The validated per-run task configuration.
//!
//! A [`TaskConfig`] is built once from a flat parameter set plus an optional
//! explicit task list, and is immutable afterwards:
//!
//! ```text
//! Params + explicit tasks
//!     │  TaskConfigBuilder::build   (infer, default, validate)
//!     ▼
//! TaskConfig
//!     │  TaskConfig::task_queue     (engine queue entries)
//!     ▼
//! EngineDocuments::apply          (gui.json / gui.new.json)
//! ```

use crate::error::Result;
use crate::params::{ParamEnum, ParamReader, Params};
use crate::task::TaskKind;
use crate::task_params::{
    AwardParams, FightParams, InfrastParams, MallParams, PostAction, ReclamationParams,
    RecruitParams, RoguelikeParams, StartUpParams, REMAIN_FIGHT_NAME,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// TaskConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskConfig {
    /// Enabled tasks in engine queue order. Always contains `StartUp`.
    pub tasks: BTreeSet<TaskKind>,
    pub post_action: PostAction,
    pub start_up: StartUpParams,
    pub fight: FightParams,
    pub recruit: RecruitParams,
    pub infrast: InfrastParams,
    pub mall: MallParams,
    pub award: AwardParams,
    pub roguelike: RoguelikeParams,
    pub reclamation: ReclamationParams,
    /// Parameter names that matched nothing.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignored_params: Vec<String>,
}

impl TaskConfig {
    pub fn builder(params: &Params) -> TaskConfigBuilder<'_> {
        TaskConfigBuilder::new(params)
    }

    pub fn is_enabled(&self, kind: TaskKind) -> bool {
        self.tasks.contains(&kind)
    }

    /// Build the engine's `TaskQueue` array.
    ///
    /// `existing` is the queue currently in the engine's configuration; the
    /// first entry of each task type is reused as a template so keys this
    /// crate does not manage survive. Every catalogue task appears exactly
    /// once, with `IsEnable` reflecting this configuration, in catalogue
    /// order. A leftover-sanity combat entry follows `Fight` when configured.
    pub fn task_queue(&self, existing: &[Value]) -> Vec<Value> {
        let mut queue = Vec::with_capacity(TaskKind::all().len() + 1);
        for &kind in TaskKind::all() {
            let mut entry = template_for(kind, existing);
            self.apply_task(kind, &mut entry);
            entry.insert("IsEnable".into(), Value::Bool(self.is_enabled(kind)));
            queue.push(Value::Object(entry));

            if kind == TaskKind::Fight && self.is_enabled(TaskKind::Fight) {
                if let Some(remain) = self.fight.remain_entry() {
                    queue.push(remain);
                }
            }
        }
        queue
    }

    /// Queue entry names the engine reports as finished when every enabled
    /// task has run.
    pub fn completion_markers(&self) -> BTreeSet<String> {
        let mut markers: BTreeSet<String> = self
            .tasks
            .iter()
            .map(|k| k.display_name().to_string())
            .collect();
        if self.is_enabled(TaskKind::Fight) && self.fight.remain_entry().is_some() {
            markers.insert(REMAIN_FIGHT_NAME.to_string());
        }
        markers
    }

    fn apply_task(&self, kind: TaskKind, entry: &mut Map<String, Value>) {
        match kind {
            TaskKind::StartUp => self.start_up.apply(entry),
            TaskKind::Fight => {
                self.fight.apply_base(entry);
                if self.is_enabled(TaskKind::Fight) {
                    self.fight.apply_extensions(entry);
                }
            }
            _ if !self.is_enabled(kind) => {}
            TaskKind::Recruit => self.recruit.apply(entry),
            TaskKind::Infrast => self.infrast.apply(entry),
            TaskKind::Mall => self.mall.apply(entry),
            TaskKind::Award => self.award.apply(entry),
            TaskKind::Roguelike => self.roguelike.apply(entry),
            TaskKind::Reclamation => self.reclamation.apply(entry),
            TaskKind::CloseDown => {}
        }
    }
}

fn template_for(kind: TaskKind, existing: &[Value]) -> Map<String, Value> {
    let found = existing.iter().find_map(|item| match item {
        Value::Object(obj)
            if obj.get("TaskType").and_then(Value::as_str) == Some(kind.engine_name()) =>
        {
            Some(obj.clone())
        }
        _ => None,
    });
    let mut entry = found.unwrap_or_else(|| {
        let mut fresh = Map::new();
        fresh.insert("$type".into(), Value::String(format!("{kind}Task")));
        fresh.insert("IsEnable".into(), Value::Bool(false));
        fresh.insert("TaskType".into(), Value::String(kind.engine_name().into()));
        fresh
    });
    entry.insert("Name".into(), Value::String(kind.display_name().into()));
    entry
}

// ---------------------------------------------------------------------------
// TaskConfigBuilder
// ---------------------------------------------------------------------------

pub struct TaskConfigBuilder<'a> {
    params: &'a Params,
    explicit: Vec<String>,
}

impl<'a> TaskConfigBuilder<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self {
            params,
            explicit: Vec::new(),
        }
    }

    /// Tasks requested by name (engine names or aliases).
    pub fn tasks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.explicit.extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate and assemble. Fails on the first unknown task or malformed
    /// parameter; nothing is produced on failure.
    pub fn build(self) -> Result<TaskConfig> {
        let mut tasks = BTreeSet::new();
        tasks.insert(TaskKind::StartUp);
        for name in &self.explicit {
            tasks.insert(name.parse::<TaskKind>()?);
        }
        tasks.extend(infer_tasks(self.params));

        let mut reader = ParamReader::new(self.params);
        let config = TaskConfig {
            post_action: reader.choice("post_action", PostAction::NoAction)?,
            start_up: StartUpParams::read(&mut reader)?,
            fight: FightParams::read(&mut reader)?,
            recruit: RecruitParams::read(&mut reader)?,
            infrast: InfrastParams::read(&mut reader)?,
            mall: MallParams::read(&mut reader)?,
            award: AwardParams::read(&mut reader)?,
            roguelike: RoguelikeParams::read(&mut reader)?,
            reclamation: ReclamationParams::read(&mut reader)?,
            ignored_params: reader.unconsumed(),
            tasks,
        };

        if !config.ignored_params.is_empty() {
            tracing::warn!(params = ?config.ignored_params, "ignoring unknown parameters");
        }
        tracing::debug!(
            tasks = ?config.tasks,
            post_action = config.post_action.as_str(),
            "task config built"
        );
        Ok(config)
    }
}

/// Tasks implied by the parameters present, independent of any explicit
/// selection.
pub fn infer_tasks(params: &Params) -> BTreeSet<TaskKind> {
    params
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(name, _)| TaskKind::inferred_from_param(name))
        .collect()
}
