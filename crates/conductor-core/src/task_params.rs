//! Typed parameter bags, one per engine task, and how each one lands in the
//! engine's queue entry.
//!
//! Defaults mirror the engine's own so that an empty parameter set produces
//! the queue the engine would have built itself.

use crate::error::Result;
use crate::params::{ParamEnum, ParamReader};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

macro_rules! param_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl ParamEnum for $name {
            fn variants() -> &'static [Self] {
                &[$($name::$variant),+]
            }

            fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(self.as_str())
            }
        }
    };
}

param_enum!(FightMode {
    Routine => "Routine",
    Annihilation => "Annihilation",
});

param_enum!(ClientType {
    Official => "Official",
    Bilibili => "Bilibili",
    YoStarEn => "YoStarEN",
    YoStarJp => "YoStarJP",
    YoStarKr => "YoStarKR",
    Txwy => "txwy",
});

param_enum!(
    /// What the engine does once its queue finishes.
    PostAction {
        NoAction => "NoAction",
        ExitGame => "ExitGame",
        ExitEmulator => "ExitEmulator",
        ExitSelf => "ExitSelf",
    }
);

impl PostAction {
    /// Bit-flag value stored in `MainFunction.PostActions`.
    pub fn engine_code(&self) -> &'static str {
        match self {
            PostAction::NoAction => "0",
            PostAction::ExitGame => "1",
            PostAction::ExitEmulator => "4",
            PostAction::ExitSelf => "8",
        }
    }
}

param_enum!(InfrastMode {
    Normal => "Normal",
    Custom => "Custom",
    Rotation => "Rotation",
});

param_enum!(DroneUse {
    Money => "Money",
    Combat => "Combat",
    Power => "Power",
});

param_enum!(RoguelikeTheme {
    Phantom => "Phantom",
    Mizuki => "Mizuki",
    Sami => "Sami",
    Sarkaz => "Sarkaz",
    JieGarden => "JieGarden",
});

param_enum!(RoguelikeMode {
    Exp => "Exp",
    Collectible => "Collectible",
    Investment => "Investment",
});

param_enum!(ReclamationTheme {
    Tales => "Tales",
    Reclamation2 => "Reclamation2",
});

/// Queue entry name of the extra combat pass that spends leftover sanity.
pub const REMAIN_FIGHT_NAME: &str = "剩余理智-刷关";

type Entry = Map<String, Value>;

fn put(entry: &mut Entry, key: &str, value: impl Into<Value>) {
    entry.insert(key.to_string(), value.into());
}

fn joined(items: &[String]) -> String {
    items.join(";")
}

// ---------------------------------------------------------------------------
// StartUp
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartUpParams {
    pub client_type: ClientType,
    pub account_name: String,
}

impl StartUpParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            client_type: r.choice("client_type", ClientType::Official)?,
            account_name: r.text("account_name", "")?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "AccountName", self.account_name.as_str());
    }
}

// ---------------------------------------------------------------------------
// Fight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FightParams {
    pub mode: FightMode,
    /// Primary stage followed by the fallbacks, blanks and `-` removed.
    pub stage_plan: Vec<String>,
    pub remain_stage: Option<String>,
    pub medicine_count: u32,
    pub stone_count: u32,
    pub annihilation_stage: String,
    pub times_limit: u32,
    pub drop_id: Option<String>,
    pub drop_count: u32,
    pub is_dr_grandet: bool,
    pub use_expiring_medicine: bool,
    pub series: u32,
}

impl FightParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        let mode = r.choice("fight_mode", FightMode::Routine)?;
        let mut stage_plan = Vec::new();
        for (key, default) in [("stage", "1-7"), ("stage_1", ""), ("stage_2", ""), ("stage_3", "")] {
            let stage = r.text(key, default)?;
            if !stage.is_empty() && stage != "-" {
                stage_plan.push(stage);
            }
        }
        let remain_stage = Some(r.text("remain_stage", "")?).filter(|s| !s.is_empty());
        Ok(Self {
            mode,
            stage_plan,
            remain_stage,
            medicine_count: r.count("medicine_count", 0)?,
            stone_count: r.count("stone_count", 0)?,
            annihilation_stage: r.text("annihilation_stage", "Annihilation")?,
            times_limit: r.count("fight_times_limit", 0)?,
            drop_id: Some(r.text("fight_drop_id", "")?).filter(|s| !s.is_empty()),
            drop_count: r.count("fight_drop_count", 0)?,
            is_dr_grandet: r.flag("fight_is_dr_grandet", false)?,
            use_expiring_medicine: r.flag("fight_use_expiring_medicine", false)?,
            series: r.count("fight_series", 0)?,
        })
    }

    /// Stage and sanity settings. Written even when combat is disabled so the
    /// engine's own panel reflects the run.
    pub fn apply_base(&self, entry: &mut Entry) {
        match self.mode {
            FightMode::Annihilation => {
                put(entry, "IsStageManually", true);
                put(entry, "StagePlan", json!([]));
                put(entry, "UseMedicine", false);
                put(entry, "MedicineCount", 0);
                put(entry, "UseStone", false);
                put(entry, "StoneCount", 0);
                put(entry, "AnnihilationStage", self.annihilation_stage.as_str());
            }
            FightMode::Routine => {
                put(entry, "UseMedicine", self.medicine_count > 0);
                put(entry, "MedicineCount", self.medicine_count);
                put(entry, "UseStone", self.stone_count > 0);
                put(entry, "StoneCount", self.stone_count);
                put(entry, "StagePlan", json!(self.stage_plan));
                put(entry, "IsStageManually", true);
            }
        }
    }

    /// Limits and drop targets, only meaningful for an enabled routine fight.
    pub fn apply_extensions(&self, entry: &mut Entry) {
        if self.mode != FightMode::Routine {
            return;
        }
        if self.times_limit > 0 {
            put(entry, "EnableTimesLimit", true);
            put(entry, "TimesLimit", self.times_limit);
        }
        if let Some(drop_id) = &self.drop_id {
            put(entry, "EnableTargetDrop", true);
            put(entry, "DropId", drop_id.as_str());
            put(entry, "DropCount", self.drop_count);
        }
        put(entry, "UseExpiringMedicine", self.use_expiring_medicine);
        put(entry, "IsDrGrandet", self.is_dr_grandet);
        if self.series > 0 {
            put(entry, "Series", self.series);
        }
    }

    /// Extra queue entry that spends leftover sanity on `remain_stage`.
    pub fn remain_entry(&self) -> Option<Value> {
        if self.mode != FightMode::Routine {
            return None;
        }
        let stage = self.remain_stage.as_deref()?;
        Some(json!({
            "$type": "FightTask",
            "Name": REMAIN_FIGHT_NAME,
            "IsEnable": true,
            "TaskType": "Fight",
            "IsStageManually": true,
            "StagePlan": [stage],
            "UseMedicine": false,
            "MedicineCount": 0,
            "UseStone": false,
            "StoneCount": 0,
        }))
    }
}

// ---------------------------------------------------------------------------
// Recruit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecruitParams {
    pub use_expedited: bool,
    pub max_times: u32,
    pub refresh_level3: bool,
    pub force_refresh: bool,
    pub level1_not_choose: bool,
    pub level3_choose: bool,
    pub level4_choose: bool,
    pub level5_choose: bool,
    pub level3_time: u32,
    pub level4_time: u32,
    pub level5_time: u32,
}

impl RecruitParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            use_expedited: r.flag("recruit_use_expedited", false)?,
            max_times: r.count("recruit_max_times", 4)?,
            refresh_level3: r.flag("recruit_refresh_level3", true)?,
            force_refresh: r.flag("recruit_force_refresh", true)?,
            level1_not_choose: r.flag("recruit_level1_not_choose", true)?,
            level3_choose: r.flag("recruit_level3_choose", true)?,
            level4_choose: r.flag("recruit_level4_choose", true)?,
            level5_choose: r.flag("recruit_level5_choose", false)?,
            level3_time: r.count("recruit_level3_time", 540)?,
            level4_time: r.count("recruit_level4_time", 540)?,
            level5_time: r.count("recruit_level5_time", 540)?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "UseExpedited", self.use_expedited);
        put(entry, "MaxTimes", self.max_times);
        put(entry, "RefreshLevel3", self.refresh_level3);
        put(entry, "ForceRefresh", self.force_refresh);
        put(entry, "Level1NotChoose", self.level1_not_choose);
        put(entry, "Level3Choose", self.level3_choose);
        put(entry, "Level4Choose", self.level4_choose);
        put(entry, "Level5Choose", self.level5_choose);
        put(entry, "Level3Time", self.level3_time);
        put(entry, "Level4Time", self.level4_time);
        put(entry, "Level5Time", self.level5_time);
    }
}

// ---------------------------------------------------------------------------
// Infrast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfrastParams {
    pub mode: InfrastMode,
    pub plan_file: Option<String>,
    pub plan_index: i64,
    pub uses_of_drones: DroneUse,
    pub dorm_threshold: u32,
    pub dorm_trust_enabled: bool,
    pub originium_shard_auto_replenishment: bool,
    pub dorm_filter_not_stationed: bool,
    pub reception_message_board: bool,
    pub reception_clue_exchange: bool,
    pub send_clue: bool,
    pub continue_training: bool,
    /// `None` keeps the engine's current room list.
    pub rooms: Option<Vec<Value>>,
}

impl InfrastParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            mode: r.choice("infrast_mode", InfrastMode::Normal)?,
            plan_file: Some(r.text("custom_infrast_path", "")?).filter(|s| !s.is_empty()),
            plan_index: r.int("custom_infrast_plan_index", -1)?,
            uses_of_drones: r.choice("infrast_uses_of_drones", DroneUse::Money)?,
            dorm_threshold: r.count("infrast_dorm_threshold", 30)?,
            dorm_trust_enabled: r.flag("infrast_dorm_trust_enabled", true)?,
            originium_shard_auto_replenishment: r
                .flag("infrast_originium_shard_auto_replenishment", true)?,
            dorm_filter_not_stationed: r.flag("infrast_dorm_filter_not_stationed", true)?,
            reception_message_board: r.flag("infrast_reception_message_board", true)?,
            reception_clue_exchange: r.flag("infrast_reception_clue_exchange", true)?,
            send_clue: r.flag("infrast_send_clue", true)?,
            continue_training: r.flag("infrast_continue_training", false)?,
            rooms: r.rooms("infrast_rooms")?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "Mode", self.mode.as_str());
        if let Some(file) = &self.plan_file {
            put(entry, "Filename", file.as_str());
        }
        put(entry, "PlanSelect", self.plan_index);
        put(entry, "UsesOfDrones", self.uses_of_drones.as_str());
        put(entry, "DormThreshold", self.dorm_threshold);
        put(entry, "DormTrustEnabled", self.dorm_trust_enabled);
        put(
            entry,
            "OriginiumShardAutoReplenishment",
            self.originium_shard_auto_replenishment,
        );
        put(entry, "DormFilterNotStationed", self.dorm_filter_not_stationed);
        put(entry, "ReceptionMessageBoard", self.reception_message_board);
        put(entry, "ContinueTraining", self.continue_training);
        put(entry, "ReceptionClueExchange", self.reception_clue_exchange);
        put(entry, "SendClue", self.send_clue);
        if let Some(rooms) = &self.rooms {
            put(entry, "RoomList", Value::Array(rooms.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Mall
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MallParams {
    pub shopping: bool,
    pub credit_fight: bool,
    pub credit_fight_once_a_day: bool,
    pub visit_friends: bool,
    pub visit_friends_once_a_day: bool,
    pub first_list: Vec<String>,
    pub black_list: Vec<String>,
    pub ignore_black_list_when_full: bool,
    pub only_buy_discount: bool,
    pub reserve_max_credit: bool,
}

impl MallParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            shopping: r.flag("mall_shopping", true)?,
            credit_fight: r.flag("mall_credit_fight", false)?,
            credit_fight_once_a_day: r.flag("mall_credit_fight_once_a_day", true)?,
            visit_friends: r.flag("mall_visit_friends", true)?,
            visit_friends_once_a_day: r.flag("mall_visit_friends_once_a_day", false)?,
            first_list: r.list("mall_first_list", &["招聘许可"])?,
            black_list: r.list("mall_black_list", &["碳", "家具", "加急许可"])?,
            ignore_black_list_when_full: r
                .flag("mall_shopping_ignore_black_list_when_full", false)?,
            only_buy_discount: r.flag("mall_only_buy_discount", false)?,
            reserve_max_credit: r.flag("mall_reserve_max_credit", false)?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "Shopping", self.shopping);
        put(entry, "CreditFight", self.credit_fight);
        put(entry, "CreditFightOnceADay", self.credit_fight_once_a_day);
        put(entry, "VisitFriends", self.visit_friends);
        put(entry, "VisitFriendsOnceADay", self.visit_friends_once_a_day);
        put(entry, "FirstList", joined(&self.first_list));
        put(entry, "BlackList", joined(&self.black_list));
        put(
            entry,
            "ShoppingIgnoreBlackListWhenFull",
            self.ignore_black_list_when_full,
        );
        put(entry, "OnlyBuyDiscount", self.only_buy_discount);
        put(entry, "ReserveMaxCredit", self.reserve_max_credit);
    }
}

// ---------------------------------------------------------------------------
// Award
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardParams {
    pub mail: bool,
    pub free_gacha: bool,
    pub orundum: bool,
    pub mining: bool,
    pub special_access: bool,
}

impl AwardParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            mail: r.flag("award_mail", false)?,
            free_gacha: r.flag("award_free_gacha", false)?,
            orundum: r.flag("award_orundum", false)?,
            mining: r.flag("award_mining", false)?,
            special_access: r.flag("award_special_access", false)?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "Award", true);
        put(entry, "Mail", self.mail);
        put(entry, "FreeGacha", self.free_gacha);
        put(entry, "Orundum", self.orundum);
        put(entry, "Mining", self.mining);
        put(entry, "SpecialAccess", self.special_access);
    }
}

// ---------------------------------------------------------------------------
// Roguelike
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoguelikeParams {
    pub theme: RoguelikeTheme,
    pub mode: RoguelikeMode,
    pub squad: String,
    pub squad_collectible: String,
    pub roles: String,
    pub core_char: String,
    pub start_count: u32,
    pub difficulty: i64,
    pub investment: bool,
    pub invest_count: u32,
    pub invest_with_more_score: bool,
    pub collectible_start_awards: String,
    pub collectible_shopping: bool,
    pub start_with_elite_two: bool,
    pub start_with_elite_two_only: bool,
    pub expected_collapsal_paradigms: Vec<String>,
    pub monthly_squad_auto_iterate: bool,
    pub monthly_squad_check_comms: bool,
    pub deep_exploration_auto_iterate: bool,
    pub find_playtime_target: String,
    pub use_support: bool,
    pub use_support_non_friend: bool,
    pub refresh_trader_with_dice: bool,
    pub squad_is_foldartal: bool,
    pub sami_first_floor_foldartal: bool,
    pub sami_first_floor_foldartals: Vec<String>,
    pub sami_new_squad2_starting_foldartal: bool,
    pub sami_new_squad2_starting_foldartals: Vec<String>,
    pub stop_when_deposit_full: bool,
    pub stop_at_final_boss: bool,
    pub stop_when_level_max: bool,
    pub start_with_seed: bool,
    pub seed: String,
}

impl RoguelikeParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            theme: r.choice("roguelike_theme", RoguelikeTheme::JieGarden)?,
            mode: r.choice("roguelike_mode", RoguelikeMode::Exp)?,
            squad: r.text("roguelike_squad", "指挥分队")?,
            squad_collectible: r.text("roguelike_squad_collectible", "指挥分队")?,
            roles: r.text("roguelike_roles", "稳扎稳打")?,
            core_char: r.text("roguelike_core_char", "")?,
            start_count: r.count("roguelike_start_count", 999_999)?,
            difficulty: r.int("roguelike_difficulty", i64::from(i32::MAX))?,
            investment: r.flag("roguelike_investment", true)?,
            invest_count: r.count("roguelike_invest_count", 999)?,
            invest_with_more_score: r.flag("roguelike_invest_with_more_score", false)?,
            collectible_start_awards: r.text("roguelike_collectible_start_awards", "HotWater")?,
            collectible_shopping: r.flag("roguelike_collectible_shopping", false)?,
            start_with_elite_two: r.flag("roguelike_start_with_elite_two", false)?,
            start_with_elite_two_only: r.flag("roguelike_start_with_elite_two_only", false)?,
            expected_collapsal_paradigms: r.list("roguelike_expected_collapsal_paradigms", &[])?,
            monthly_squad_auto_iterate: r.flag("roguelike_monthly_squad_auto_iterate", true)?,
            monthly_squad_check_comms: r.flag("roguelike_monthly_squad_check_comms", true)?,
            deep_exploration_auto_iterate: r
                .flag("roguelike_deep_exploration_auto_iterate", true)?,
            find_playtime_target: r.text("roguelike_find_playtime_target", "Ling")?,
            use_support: r.flag("roguelike_use_support", false)?,
            use_support_non_friend: r.flag("roguelike_use_support_non_friend", false)?,
            refresh_trader_with_dice: r.flag("roguelike_refresh_trader_with_dice", false)?,
            squad_is_foldartal: r.flag("roguelike_squad_is_foldartal", false)?,
            sami_first_floor_foldartal: r.flag("roguelike_sami_first_floor_foldartal", false)?,
            sami_first_floor_foldartals: r.list("roguelike_sami_first_floor_foldartals", &[])?,
            sami_new_squad2_starting_foldartal: r
                .flag("roguelike_sami_new_squad2_starting_foldartal", false)?,
            sami_new_squad2_starting_foldartals: r
                .list("roguelike_sami_new_squad2_starting_foldartals", &[])?,
            stop_when_deposit_full: r.flag("roguelike_stop_when_deposit_full", false)?,
            stop_at_final_boss: r.flag("roguelike_stop_at_final_boss", false)?,
            stop_when_level_max: r.flag("roguelike_stop_when_level_max", false)?,
            start_with_seed: r.flag("roguelike_start_with_seed", false)?,
            seed: r.text("roguelike_seed", "")?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "Theme", self.theme.as_str());
        put(entry, "Mode", self.mode.as_str());
        put(entry, "StartCount", self.start_count);
        if !self.squad.is_empty() {
            put(entry, "Squad", self.squad.as_str());
        }
        if !self.squad_collectible.is_empty() {
            put(entry, "SquadCollectible", self.squad_collectible.as_str());
        }
        put(entry, "Difficulty", self.difficulty);
        if !self.roles.is_empty() {
            put(entry, "Roles", self.roles.as_str());
        }
        if !self.core_char.is_empty() {
            put(entry, "CoreChar", self.core_char.as_str());
        }
        put(entry, "Investment", self.investment);
        put(entry, "InvestCount", self.invest_count);
        put(entry, "InvestWithMoreScore", self.invest_with_more_score);
        put(entry, "UseSupport", self.use_support);
        put(entry, "UseSupportNonFriend", self.use_support_non_friend);
        put(entry, "StopWhenDepositFull", self.stop_when_deposit_full);
        put(entry, "StopAtFinalBoss", self.stop_at_final_boss);
        put(entry, "StopWhenLevelMax", self.stop_when_level_max);
        put(entry, "StartWithEliteTwo", self.start_with_elite_two);
        put(entry, "StartWithEliteTwoOnly", self.start_with_elite_two_only);
        put(
            entry,
            "CollectibleStartAwards",
            self.collectible_start_awards.as_str(),
        );
        put(entry, "CollectibleShopping", self.collectible_shopping);
        put(entry, "MonthlySquadAutoIterate", self.monthly_squad_auto_iterate);
        put(entry, "MonthlySquadCheckComms", self.monthly_squad_check_comms);
        put(
            entry,
            "DeepExplorationAutoIterate",
            self.deep_exploration_auto_iterate,
        );
        put(entry, "FindPlaytimeTarget", self.find_playtime_target.as_str());
        put(entry, "RefreshTraderWithDice", self.refresh_trader_with_dice);
        put(entry, "SquadIsFoldartal", self.squad_is_foldartal);
        if !self.expected_collapsal_paradigms.is_empty() {
            put(
                entry,
                "ExpectedCollapsalParadigms",
                joined(&self.expected_collapsal_paradigms),
            );
        }
        put(entry, "SamiFirstFloorFoldartal", self.sami_first_floor_foldartal);
        if !self.sami_first_floor_foldartals.is_empty() {
            put(
                entry,
                "SamiFirstFloorFoldartals",
                joined(&self.sami_first_floor_foldartals),
            );
        }
        put(
            entry,
            "SamiNewSquad2StartingFoldartal",
            self.sami_new_squad2_starting_foldartal,
        );
        if !self.sami_new_squad2_starting_foldartals.is_empty() {
            put(
                entry,
                "SamiNewSquad2StartingFoldartals",
                joined(&self.sami_new_squad2_starting_foldartals),
            );
        }
        put(entry, "StartWithSeed", self.start_with_seed);
        if !self.seed.is_empty() {
            put(entry, "Seed", self.seed.as_str());
        }
    }
}

// ---------------------------------------------------------------------------
// Reclamation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReclamationParams {
    pub theme: ReclamationTheme,
    pub mode: String,
    pub tool_to_craft: String,
    pub increment_mode: i64,
    pub max_craft_count: u32,
    pub clear_store: bool,
}

impl ReclamationParams {
    pub fn read(r: &mut ParamReader<'_>) -> Result<Self> {
        Ok(Self {
            theme: r.choice("reclamation_theme", ReclamationTheme::Tales)?,
            mode: r.text("reclamation_mode", "Archive")?,
            tool_to_craft: r.text("reclamation_tool_to_craft", "")?,
            increment_mode: r.int("reclamation_increment_mode", 0)?,
            max_craft_count: r.count("reclamation_max_craft_count", 16)?,
            clear_store: r.flag("reclamation_clear_store", true)?,
        })
    }

    pub fn apply(&self, entry: &mut Entry) {
        put(entry, "Theme", self.theme.as_str());
        put(entry, "Mode", self.mode.as_str());
        if !self.tool_to_craft.is_empty() {
            put(entry, "ToolToCraft", self.tool_to_craft.as_str());
        }
        put(entry, "IncrementMode", self.increment_mode);
        put(entry, "MaxCraftCountPerRound", self.max_craft_count);
        put(entry, "ClearStore", self.clear_store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    fn read<T>(value: Value, f: impl FnOnce(&mut ParamReader<'_>) -> Result<T>) -> Result<T> {
        let params: Params = serde_json::from_value(value).unwrap();
        let mut reader = ParamReader::new(&params);
        f(&mut reader)
    }

    #[test]
    fn fight_stage_plan_skips_blanks_and_dashes() {
        let fight = read(
            json!({"stage": "CE-6", "stage_1": "-", "stage_2": "AP-5"}),
            FightParams::read,
        )
        .unwrap();
        assert_eq!(fight.stage_plan, vec!["CE-6", "AP-5"]);
    }

    #[test]
    fn fight_routine_base_sets_sanity_flags() {
        let fight = read(json!({"medicine_count": 20}), FightParams::read).unwrap();
        let mut entry = Entry::new();
        fight.apply_base(&mut entry);
        assert_eq!(entry["UseMedicine"], json!(true));
        assert_eq!(entry["MedicineCount"], json!(20));
        assert_eq!(entry["UseStone"], json!(false));
        assert_eq!(entry["StagePlan"], json!(["1-7"]));
    }

    #[test]
    fn fight_annihilation_clears_stage_plan() {
        let fight = read(
            json!({"fight_mode": "Annihilation", "medicine_count": 5}),
            FightParams::read,
        )
        .unwrap();
        let mut entry = Entry::new();
        fight.apply_base(&mut entry);
        assert_eq!(entry["StagePlan"], json!([]));
        assert_eq!(entry["MedicineCount"], json!(0));
        assert_eq!(entry["AnnihilationStage"], json!("Annihilation"));
        assert!(fight.remain_entry().is_none());
    }

    #[test]
    fn fight_extensions_only_when_set() {
        let fight = read(
            json!({"fight_times_limit": 3, "fight_drop_id": "30012", "fight_drop_count": 10}),
            FightParams::read,
        )
        .unwrap();
        let mut entry = Entry::new();
        fight.apply_extensions(&mut entry);
        assert_eq!(entry["EnableTimesLimit"], json!(true));
        assert_eq!(entry["TimesLimit"], json!(3));
        assert_eq!(entry["DropId"], json!("30012"));
        assert!(!entry.contains_key("Series"));
    }

    #[test]
    fn client_type_rejects_unknown_value() {
        let err = read(json!({"client_type": "Steam"}), StartUpParams::read).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("client_type"));
        assert!(msg.contains("Bilibili"));
    }

    #[test]
    fn client_type_is_case_insensitive() {
        let start = read(json!({"client_type": "bilibili"}), StartUpParams::read).unwrap();
        assert_eq!(start.client_type, ClientType::Bilibili);
    }

    #[test]
    fn mall_lists_serialize_joined() {
        let mall = read(json!({"mall_black_list": ["碳", "家具"]}), MallParams::read).unwrap();
        let mut entry = Entry::new();
        mall.apply(&mut entry);
        assert_eq!(entry["BlackList"], json!("碳;家具"));
        assert_eq!(entry["FirstList"], json!("招聘许可"));
    }

    #[test]
    fn roguelike_defaults_match_engine() {
        let rogue = read(json!({}), RoguelikeParams::read).unwrap();
        let mut entry = Entry::new();
        rogue.apply(&mut entry);
        assert_eq!(entry["Theme"], json!("JieGarden"));
        assert_eq!(entry["Difficulty"], json!(2147483647));
        assert_eq!(entry["StartCount"], json!(999999));
        assert!(!entry.contains_key("Seed"));
        assert!(!entry.contains_key("ExpectedCollapsalParadigms"));
    }

    #[test]
    fn infrast_keeps_room_list_when_unset() {
        let infrast = read(json!({}), InfrastParams::read).unwrap();
        let mut entry = Entry::new();
        entry.insert("RoomList".into(), json!([{"Room": "Dorm", "IsEnabled": true}]));
        infrast.apply(&mut entry);
        assert_eq!(entry["RoomList"], json!([{"Room": "Dorm", "IsEnabled": true}]));
        assert_eq!(entry["PlanSelect"], json!(-1));
    }

    #[test]
    fn post_action_codes() {
        assert_eq!(PostAction::NoAction.engine_code(), "0");
        assert_eq!(PostAction::ExitEmulator.engine_code(), "4");
        assert_eq!(PostAction::ExitSelf.engine_code(), "8");
    }
}
