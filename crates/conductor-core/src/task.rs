use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// The engine's task catalogue.
///
/// Declaration order is the order the engine runs its queue in, so the derived
/// `Ord` doubles as queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    StartUp,
    CloseDown,
    Fight,
    Recruit,
    Infrast,
    Mall,
    Award,
    Roguelike,
    Reclamation,
}

impl TaskKind {
    pub fn all() -> &'static [TaskKind] {
        &[
            TaskKind::StartUp,
            TaskKind::CloseDown,
            TaskKind::Fight,
            TaskKind::Recruit,
            TaskKind::Infrast,
            TaskKind::Mall,
            TaskKind::Award,
            TaskKind::Roguelike,
            TaskKind::Reclamation,
        ]
    }

    /// The `TaskType` value the engine expects in its queue.
    pub fn engine_name(&self) -> &'static str {
        match self {
            TaskKind::StartUp => "StartUp",
            TaskKind::CloseDown => "CloseDown",
            TaskKind::Fight => "Fight",
            TaskKind::Recruit => "Recruit",
            TaskKind::Infrast => "Infrast",
            TaskKind::Mall => "Mall",
            TaskKind::Award => "Award",
            TaskKind::Roguelike => "Roguelike",
            TaskKind::Reclamation => "Reclamation",
        }
    }

    /// Queue entry name under the zh-cn locale; the engine log refers to
    /// tasks by this name.
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskKind::StartUp => "开始唤醒",
            TaskKind::CloseDown => "关闭游戏",
            TaskKind::Fight => "刷理智",
            TaskKind::Recruit => "自动公招",
            TaskKind::Infrast => "基建换班",
            TaskKind::Mall => "领取信用及购物",
            TaskKind::Award => "领取日常奖励",
            TaskKind::Roguelike => "自动肉鸽",
            TaskKind::Reclamation => "生息演算",
        }
    }

    /// Reverse lookup from the name that appears in the engine log.
    pub fn from_display_name(name: &str) -> Option<TaskKind> {
        let name = name.trim();
        TaskKind::all()
            .iter()
            .copied()
            .find(|k| k.display_name() == name)
    }

    /// Resolve a user-supplied task name: engine names and the aliases below,
    /// case-insensitive, with `-` and `_` treated alike.
    pub fn parse(name: &str) -> Option<TaskKind> {
        let key = name.trim().to_ascii_lowercase().replace('_', "-");
        let kind = match key.as_str() {
            "startup" | "start-up" | "wakeup" => TaskKind::StartUp,
            "closedown" | "close-down" | "close-game" => TaskKind::CloseDown,
            "fight" | "combat" => TaskKind::Fight,
            "recruit" | "recruitment" => TaskKind::Recruit,
            "infrast" | "base" | "base-management" => TaskKind::Infrast,
            "mall" | "shop" | "credit-shop" => TaskKind::Mall,
            "award" | "rewards" | "daily-rewards" => TaskKind::Award,
            "roguelike" | "rogue" => TaskKind::Roguelike,
            "reclamation" => TaskKind::Reclamation,
            _ => return None,
        };
        Some(kind)
    }

    /// Which task a parameter name implies, if any.
    ///
    /// Combat is recognised by its exact parameter names; the remaining tasks by
    /// prefix. Parameters shared by every run (client type, account, post
    /// action) imply nothing.
    pub fn inferred_from_param(name: &str) -> Option<TaskKind> {
        if FIGHT_PARAMS.contains(&name) {
            return Some(TaskKind::Fight);
        }
        PREFIX_RULES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }
}

const FIGHT_PARAMS: &[&str] = &[
    "fight_mode",
    "stage",
    "stage_1",
    "stage_2",
    "stage_3",
    "remain_stage",
    "medicine_count",
    "stone_count",
    "annihilation_stage",
    "fight_times_limit",
    "fight_drop_id",
    "fight_drop_count",
    "fight_use_expiring_medicine",
    "fight_series",
    "fight_is_dr_grandet",
];

const PREFIX_RULES: &[(&str, TaskKind)] = &[
    ("roguelike_", TaskKind::Roguelike),
    ("reclamation_", TaskKind::Reclamation),
    ("recruit_", TaskKind::Recruit),
    ("custom_infrast_", TaskKind::Infrast),
    ("infrast_", TaskKind::Infrast),
    ("mall_", TaskKind::Mall),
    ("award_", TaskKind::Award),
];

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_name())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::parse(s).ok_or_else(|| CoreError::UnknownTask(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(TaskKind::parse("combat"), Some(TaskKind::Fight));
        assert_eq!(TaskKind::parse("Recruitment"), Some(TaskKind::Recruit));
        assert_eq!(TaskKind::parse("base_management"), Some(TaskKind::Infrast));
        assert_eq!(TaskKind::parse("StartUp"), Some(TaskKind::StartUp));
        assert_eq!(TaskKind::parse("dance"), None);
    }

    #[test]
    fn from_str_reports_unknown_task() {
        let err = "dance".parse::<TaskKind>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownTask(ref n) if n == "dance"));
    }

    #[test]
    fn display_names_round_trip() {
        for kind in TaskKind::all() {
            assert_eq!(TaskKind::from_display_name(kind.display_name()), Some(*kind));
        }
    }

    #[test]
    fn inference_rules() {
        assert_eq!(TaskKind::inferred_from_param("stage"), Some(TaskKind::Fight));
        assert_eq!(
            TaskKind::inferred_from_param("medicine_count"),
            Some(TaskKind::Fight)
        );
        assert_eq!(
            TaskKind::inferred_from_param("custom_infrast_plan_index"),
            Some(TaskKind::Infrast)
        );
        assert_eq!(
            TaskKind::inferred_from_param("roguelike_theme"),
            Some(TaskKind::Roguelike)
        );
        assert_eq!(TaskKind::inferred_from_param("client_type"), None);
        assert_eq!(TaskKind::inferred_from_param("stages"), None);
    }

    #[test]
    fn ordering_follows_engine_queue() {
        let mut kinds = vec![TaskKind::Mall, TaskKind::StartUp, TaskKind::Fight];
        kinds.sort();
        assert_eq!(kinds, vec![TaskKind::StartUp, TaskKind::Fight, TaskKind::Mall]);
    }
}
