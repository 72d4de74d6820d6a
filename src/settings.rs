//! Engine settings: parsed once from the key/value store into an immutable
//! [`Settings`] snapshot and cached for a refresh interval.

use std::{str::FromStr, sync::Arc, time::Duration};

use chrono::NaiveTime;
use moka::future::Cache;
use tracing::{debug, warn};

use crate::store::{SettingsStore, StoreError};

pub const DEFAULT_SHIFT_BOUNDARY_HOUR: u32 = 14;
pub const DEFAULT_GRACE_PERIOD: i64 = 15;
pub const DEFAULT_MIN_OVERTIME_MINUTES: i64 = 60;
pub const DEFAULT_BREAK_DURATION: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvertimeRounding {
    None,
    Down(i64),
    Up(i64),
    Nearest(i64),
}

impl OvertimeRounding {
    pub fn apply(self, minutes: i64) -> i64 {
        match self {
            OvertimeRounding::None => minutes,
            OvertimeRounding::Down(step) => minutes / step * step,
            OvertimeRounding::Up(step) => (minutes + step - 1) / step * step,
            OvertimeRounding::Nearest(step) => (minutes + step / 2) / step * step,
        }
    }
}

impl FromStr for OvertimeRounding {
    type Err = String;

    /// Accepts `none`, `down_N`, `up_N` and `nearest_N` with N > 0 minutes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "none" || s.is_empty() {
            return Ok(OvertimeRounding::None);
        }
        let (mode, step) = s
            .split_once('_')
            .ok_or_else(|| format!("unknown rounding rule `{s}`"))?;
        let step: i64 = step
            .parse()
            .ok()
            .filter(|step| *step > 0)
            .ok_or_else(|| format!("invalid rounding step in `{s}`"))?;
        match mode {
            "down" => Ok(OvertimeRounding::Down(step)),
            "up" => Ok(OvertimeRounding::Up(step)),
            "nearest" => Ok(OvertimeRounding::Nearest(step)),
            _ => Err(format!("unknown rounding rule `{s}`")),
        }
    }
}

/// A typed break entitlement, e.g. `coffee` for 15 minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakAllowance {
    pub name: String,
    pub limit_minutes: i64,
}

/// Parses `"coffee:15, meal:60"`.
fn parse_allowances(raw: &str) -> Result<Vec<BreakAllowance>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, limit) = item
                .split_once(':')
                .ok_or_else(|| format!("break type `{item}` has no limit"))?;
            let limit_minutes = limit
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or_else(|| format!("break type `{item}` has an invalid limit"))?;
            Ok(BreakAllowance {
                name: name.trim().to_ascii_lowercase(),
                limit_minutes,
            })
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub shift_boundary_hour: u32,
    pub grace_period: i64,
    pub allow_multi_checkin: bool,
    pub prevent_duplicate_checkin: bool,
    pub allow_overtime: bool,
    pub min_overtime_minutes: i64,
    pub ot_rounding: OvertimeRounding,
    pub require_ot_approval: bool,
    pub break_start_window: Option<NaiveTime>,
    pub break_end_window: Option<NaiveTime>,
    /// Daily break cap in minutes.
    pub break_duration: i64,
    /// Maximum break segments per record; 0 means unlimited.
    pub max_breaks: u32,
    pub break_types: Vec<BreakAllowance>,
    pub auto_resume: bool,
    pub break_alerts: bool,
    pub break_penalty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shift_boundary_hour: DEFAULT_SHIFT_BOUNDARY_HOUR,
            grace_period: DEFAULT_GRACE_PERIOD,
            allow_multi_checkin: false,
            prevent_duplicate_checkin: true,
            allow_overtime: false,
            min_overtime_minutes: DEFAULT_MIN_OVERTIME_MINUTES,
            ot_rounding: OvertimeRounding::Down(15),
            require_ot_approval: true,
            break_start_window: None,
            break_end_window: None,
            break_duration: DEFAULT_BREAK_DURATION,
            max_breaks: 0,
            break_types: Vec::new(),
            auto_resume: true,
            break_alerts: true,
            break_penalty: false,
        }
    }
}

impl Settings {
    /// Builds a snapshot from raw key/value rows. Unknown keys are ignored and
    /// unparsable values keep their default.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Settings::default();
        for (key, value) in pairs {
            if let Err(reason) = settings.apply(&key, &value) {
                warn!(key = %key, value = %value, reason = %reason, "Ignoring invalid setting");
            }
        }
        settings
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        fn int<T: FromStr>(value: &str) -> Result<T, String> {
            value
                .trim()
                .parse()
                .map_err(|_| format!("`{value}` is not a number"))
        }
        fn flag(value: &str) -> Result<bool, String> {
            parse_bool(value).ok_or_else(|| format!("`{value}` is not a boolean"))
        }
        fn clock(value: &str) -> Result<Option<NaiveTime>, String> {
            if value.trim().is_empty() {
                return Ok(None);
            }
            parse_clock(value)
                .map(Some)
                .ok_or_else(|| format!("`{value}` is not HH:MM"))
        }

        match key {
            "shift_boundary_hour" => {
                let hour: u32 = int(value)?;
                if hour > 23 {
                    return Err("hour must be 0-23".into());
                }
                self.shift_boundary_hour = hour;
            }
            "grace_period" => self.grace_period = int::<i64>(value)?.max(0),
            "allow_multi_checkin" => self.allow_multi_checkin = flag(value)?,
            "prevent_duplicate_checkin" => self.prevent_duplicate_checkin = flag(value)?,
            "allow_overtime" => self.allow_overtime = flag(value)?,
            "min_overtime_minutes" => self.min_overtime_minutes = int::<i64>(value)?.max(0),
            "ot_rounding" => self.ot_rounding = value.parse()?,
            "require_ot_approval" => self.require_ot_approval = flag(value)?,
            "break_start_window" => self.break_start_window = clock(value)?,
            "break_end_window" => self.break_end_window = clock(value)?,
            "break_duration" => self.break_duration = int::<i64>(value)?.max(0),
            "max_breaks" => self.max_breaks = int(value)?,
            "break_types" => self.break_types = parse_allowances(value)?,
            "auto_resume" => self.auto_resume = flag(value)?,
            "break_alerts" => self.break_alerts = flag(value)?,
            "break_penalty" => self.break_penalty = flag(value)?,
            _ => {}
        }
        Ok(())
    }

    /// True when breaks are tracked per type, each type usable once per record.
    pub fn has_typed_breaks(&self) -> bool {
        !self.break_types.is_empty()
    }

    pub fn allowance_for(&self, break_type: &str) -> Option<&BreakAllowance> {
        let break_type = break_type.trim().to_ascii_lowercase();
        self.break_types.iter().find(|a| a.name == break_type)
    }
}

const SNAPSHOT_KEY: &str = "settings";

/// Serves a cached [`Settings`] snapshot, reloading it from the store once the
/// refresh interval has elapsed.
pub struct SettingsProvider<K> {
    source: K,
    cache: Cache<&'static str, Arc<Settings>>,
}

impl<K: SettingsStore> SettingsProvider<K> {
    pub fn new(source: K, refresh: Duration) -> Self {
        Self {
            source,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(refresh)
                .build(),
        }
    }

    pub async fn snapshot(&self) -> Result<Arc<Settings>, StoreError> {
        if let Some(settings) = self.cache.get(SNAPSHOT_KEY).await {
            return Ok(settings);
        }

        let pairs = self.source.load_settings().await?;
        let settings = Arc::new(Settings::from_pairs(pairs));
        self.cache.insert(SNAPSHOT_KEY, settings.clone()).await;
        debug!(?settings, "Settings snapshot refreshed");

        Ok(settings)
    }

    /// Drops the cached snapshot so the next read goes to the store.
    pub async fn invalidate(&self) {
        self.cache.invalidate(SNAPSHOT_KEY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySettings;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.shift_boundary_hour, 14);
        assert_eq!(s.grace_period, 15);
        assert_eq!(s.min_overtime_minutes, 60);
        assert!(s.prevent_duplicate_checkin);
        assert!(!s.allow_multi_checkin);
    }

    #[test]
    fn parses_typed_values() {
        let s = Settings::from_pairs(pairs(&[
            ("shift_boundary_hour", "6"),
            ("grace_period", "10"),
            ("allow_multi_checkin", "1"),
            ("allow_overtime", "true"),
            ("ot_rounding", "nearest_30"),
            ("break_start_window", "12:00"),
            ("break_end_window", "14:30"),
            ("break_types", "Coffee:15, meal:60"),
            ("unrelated", "whatever"),
        ]));
        assert_eq!(s.shift_boundary_hour, 6);
        assert_eq!(s.grace_period, 10);
        assert!(s.allow_multi_checkin);
        assert!(s.allow_overtime);
        assert_eq!(s.ot_rounding, OvertimeRounding::Nearest(30));
        assert_eq!(s.break_start_window, NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(s.break_end_window, NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(s.allowance_for("coffee").map(|a| a.limit_minutes), Some(15));
        assert_eq!(s.allowance_for(" MEAL ").map(|a| a.limit_minutes), Some(60));
        assert!(s.allowance_for("nap").is_none());
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let s = Settings::from_pairs(pairs(&[
            ("shift_boundary_hour", "25"),
            ("grace_period", "soon"),
            ("ot_rounding", "sideways_15"),
            ("auto_resume", "maybe"),
        ]));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn rounding_rules() {
        assert_eq!("down_15".parse::<OvertimeRounding>().unwrap().apply(74), 60);
        assert_eq!("up_15".parse::<OvertimeRounding>().unwrap().apply(61), 75);
        assert_eq!("nearest_30".parse::<OvertimeRounding>().unwrap().apply(74), 60);
        assert_eq!("nearest_30".parse::<OvertimeRounding>().unwrap().apply(75), 90);
        assert_eq!("none".parse::<OvertimeRounding>().unwrap().apply(61), 61);
        assert!("down_0".parse::<OvertimeRounding>().is_err());
    }

    #[tokio::test]
    async fn snapshot_is_cached_until_invalidated() {
        let source = MemorySettings::with(&[("grace_period", "20")]);
        let provider = SettingsProvider::new(source.clone(), Duration::from_secs(60));

        assert_eq!(provider.snapshot().await.unwrap().grace_period, 20);

        source.set("grace_period", "5");
        assert_eq!(provider.snapshot().await.unwrap().grace_period, 20);

        provider.invalidate().await;
        assert_eq!(provider.snapshot().await.unwrap().grace_period, 5);
    }
}
