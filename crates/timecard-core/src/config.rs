use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use serde::{
  Deserialize,
  Serialize
};
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info,
  warn
};

use crate::calendar::DEFAULT_JOURNEY;
use crate::error::{
  Error,
  LookupKind
};
use crate::filter::{
  DailyFilter,
  TimesheetFilter
};
use crate::record::{
  NonBusinessDay,
  TypeTable
};

const APP_DIR: &str = "timecard";
const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_ENV_VAR: &str =
  "TIMECARD_CONFIG";

/// Billing coordinates behind a short
/// project name.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
#[serde(default)]
pub struct ProjectAlias {
  pub sales_order:      i64,
  pub sales_order_line: i64,
  pub needs_ticket:     bool
}

impl ProjectAlias {
  pub fn key(&self) -> (i64, i64) {
    (
      self.sales_order,
      self.sales_order_line
    )
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize
)]
#[serde(default)]
pub struct Profile {
  pub employee_name:   String,
  pub user_id:         u64,
  pub email:           String,
  pub employee_code:   u64,
  /// Expected hours per day.
  pub daily_journey:   f64,
  pub project_aliases:
    BTreeMap<String, ProjectAlias>
}

impl Profile {
  pub fn journey(&self) -> f64 {
    if self.daily_journey > 0.0 {
      self.daily_journey
    } else {
      DEFAULT_JOURNEY
    }
  }

  pub fn alias(
    &self,
    name: &str
  ) -> Result<&ProjectAlias, Error> {
    self
      .project_aliases
      .get(name)
      .ok_or_else(|| {
        Error::lookup(
          LookupKind::ProjectAlias,
          name
        )
      })
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize
)]
#[serde(default)]
pub struct Config {
  pub default_profile:   String,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub timezone:          Option<String>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub color:             Option<bool>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub data_dir:          Option<PathBuf>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub cache_dir:         Option<PathBuf>,
  pub profiles:
    BTreeMap<String, Profile>,
  /// Display name to code.
  pub timesheet_types:
    BTreeMap<String, String>,
  pub non_business_days:
    Vec<NonBusinessDay>,
  pub saved_filters:
    BTreeMap<String, TimesheetFilter>,
  pub saved_day_filters:
    BTreeMap<String, DailyFilter>,

  #[serde(skip)]
  pub path: PathBuf
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let path = resolve_config_path(
      config_override
    )?;

    if !path.exists() {
      warn!(
        config = %path.display(),
        "no config file found; using defaults"
      );
      return Ok(Self {
        path,
        ..Self::default()
      });
    }

    info!(config = %path.display(), "loading config");
    let text = fs::read_to_string(
      &path
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;

    let mut cfg: Config =
      toml::from_str(&text)
        .with_context(|| {
          format!(
            "failed to parse {}",
            path.display()
          )
        })?;
    cfg.path = path;

    debug!(
      profiles = cfg.profiles.len(),
      saved_filters =
        cfg.saved_filters.len(),
      saved_day_filters =
        cfg.saved_day_filters.len(),
      "loaded config"
    );
    Ok(cfg)
  }

  #[tracing::instrument(skip(self), fields(
    config = %self.path.display()
  ))]
  pub fn save(
    &self
  ) -> anyhow::Result<()> {
    let dir = self
      .path
      .parent()
      .filter(|p| {
        !p.as_os_str().is_empty()
      })
      .unwrap_or_else(|| {
        Path::new(".")
      });
    fs::create_dir_all(dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;

    let text =
      toml::to_string_pretty(self)
        .context(
          "failed to serialize config"
        )?;

    let mut temp =
      NamedTempFile::new_in(dir)?;
    temp.write_all(text.as_bytes())?;
    temp.flush()?;
    temp.persist(&self.path).map_err(
      |err| {
        anyhow!(
          "failed to persist {}: {}",
          self.path.display(),
          err
        )
      }
    )?;

    info!("saved config");
    Ok(())
  }

  /// The explicitly selected profile,
  /// else the configured default.
  pub fn profile<'a>(
    &'a self,
    selected: Option<&'a str>
  ) -> Result<(&'a str, &'a Profile), Error>
  {
    let name = selected
      .filter(|name| !name.is_empty())
      .unwrap_or(
        self.default_profile.as_str()
      );
    self
      .profiles
      .get(name)
      .map(|profile| (name, profile))
      .ok_or_else(|| {
        Error::lookup(
          LookupKind::Profile,
          name
        )
      })
  }

  pub fn timesheet_filter(
    &self,
    name: &str
  ) -> Result<&TimesheetFilter, Error>
  {
    self
      .saved_filters
      .get(name)
      .ok_or_else(|| {
        Error::lookup(
          LookupKind::TimesheetFilter,
          name
        )
      })
  }

  pub fn day_filter(
    &self,
    name: &str
  ) -> Result<&DailyFilter, Error> {
    self
      .saved_day_filters
      .get(name)
      .ok_or_else(|| {
        Error::lookup(
          LookupKind::DayFilter,
          name
        )
      })
  }

  pub fn type_table(&self) -> TypeTable {
    TypeTable::new(
      self
        .timesheet_types
        .iter()
        .map(|(name, code)| {
          (name.as_str(), code.as_str())
        })
    )
  }

  pub fn data_dir(
    &self
  ) -> anyhow::Result<PathBuf> {
    resolve_dir(
      self.data_dir.as_deref(),
      dirs::data_dir,
      "data"
    )
  }

  pub fn cache_dir(
    &self
  ) -> anyhow::Result<PathBuf> {
    resolve_dir(
      self.cache_dir.as_deref(),
      dirs::cache_dir,
      "cache"
    )
  }
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<PathBuf> {
  if let Some(path) = override_path {
    return Ok(expand_tilde(path));
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Ok(expand_tilde(
        Path::new(trimmed)
      ));
    }
  }

  let base = dirs::config_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine config \
         directory"
      )
    })?;
  Ok(
    base
      .join(APP_DIR)
      .join(CONFIG_FILE)
  )
}

#[tracing::instrument(skip(
  configured, fallback
))]
fn resolve_dir(
  configured: Option<&Path>,
  fallback: fn() -> Option<PathBuf>,
  what: &str
) -> anyhow::Result<PathBuf> {
  let dir = match configured {
    | Some(path) => expand_tilde(path),
    | None => {
      fallback()
        .ok_or_else(|| {
          anyhow!(
            "cannot determine {what} \
             directory"
          )
        })?
        .join(APP_DIR)
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating {what} directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use tempfile::tempdir;

  use super::{
    Config,
    Profile,
    ProjectAlias
  };
  use crate::error::{
    Error,
    LookupKind
  };
  use crate::filter::{
    DailyFilter,
    TimesheetFilter
  };
  use crate::record::NonBusinessDay;
  use crate::summary::DayStatus;

  const SAMPLE: &str = r#"
default_profile = "work"
timezone = "America/Sao_Paulo"

[profiles.work]
employee_name = "Ana Souza"
user_id = 42
daily_journey = 6.0

[profiles.work.project_aliases.intra]
sales_order = 100
sales_order_line = 10
needs_ticket = true

[profiles.side]
user_id = 7

[timesheet_types]
Normal = "N"
Overtime = "HE"

[[non_business_days]]
date = "2025-12-25"
name = "Christmas"

[saved_filters.long-days]
quantity = ">=8"
project = "intra"
from_date = "2025-07-01"

[saved_day_filters.short]
min_daily_hours = 8.0
status = "MISSING"
"#;

  #[test]
  fn parses_profiles_filters_and_reference_data()
   {
    let cfg: Config =
      toml::from_str(SAMPLE).unwrap();

    let (name, profile) =
      cfg.profile(None).unwrap();
    assert_eq!(name, "work");
    assert_eq!(profile.user_id, 42);
    assert_eq!(profile.journey(), 6.0);
    assert_eq!(
      profile.alias("intra").unwrap(),
      &ProjectAlias {
        sales_order:      100,
        sales_order_line: 10,
        needs_ticket:     true
      }
    );

    let filter = cfg
      .timesheet_filter("long-days")
      .unwrap();
    assert_eq!(filter.quantity, ">=8");
    assert_eq!(
      filter.from_date,
      NaiveDate::from_ymd_opt(
        2025, 7, 1
      )
    );

    let day_filter =
      cfg.day_filter("short").unwrap();
    assert_eq!(
      day_filter.status,
      Some(DayStatus::Missing)
    );

    assert_eq!(
      cfg
        .type_table()
        .code_for("Overtime"),
      Some("HE")
    );
    assert_eq!(
      cfg.non_business_days,
      vec![NonBusinessDay {
        date: NaiveDate::from_ymd_opt(
          2025, 12, 25
        )
        .unwrap(),
        name: "Christmas".to_string()
      }]
    );
  }

  #[test]
  fn explicit_profile_overrides_default()
  {
    let cfg: Config =
      toml::from_str(SAMPLE).unwrap();

    let (name, profile) = cfg
      .profile(Some("side"))
      .unwrap();
    assert_eq!(name, "side");
    assert_eq!(profile.user_id, 7);
    assert_eq!(
      profile.journey(),
      8.0
    );

    assert_eq!(
      cfg.profile(Some("ghost")),
      Err(Error::lookup(
        LookupKind::Profile,
        "ghost"
      ))
    );
    assert!(
      cfg
        .timesheet_filter("ghost")
        .is_err()
    );
  }

  #[test]
  fn missing_file_loads_defaults() {
    let temp = tempdir().unwrap();
    let path =
      temp.path().join("config.toml");
    let cfg =
      Config::load(Some(&path)).unwrap();
    assert!(cfg.profiles.is_empty());
    assert_eq!(cfg.path, path);
    assert!(cfg.profile(None).is_err());
  }

  #[test]
  fn save_then_load_keeps_everything()
  {
    let temp = tempdir().unwrap();
    let path = temp
      .path()
      .join("nested")
      .join("config.toml");

    let mut cfg =
      Config::load(Some(&path)).unwrap();
    cfg.default_profile =
      "work".to_string();
    let mut profile = Profile {
      user_id: 42,
      daily_journey: 8.0,
      ..Default::default()
    };
    profile.project_aliases.insert(
      "intra".to_string(),
      ProjectAlias {
        sales_order:      100,
        sales_order_line: 10,
        needs_ticket:     false
      }
    );
    cfg
      .profiles
      .insert("work".to_string(), profile);
    cfg.saved_filters.insert(
      "tickets".to_string(),
      TimesheetFilter {
        has_ticket_only: true,
        type_name: "Normal".to_string(),
        ..Default::default()
      }
    );
    cfg.saved_day_filters.insert(
      "full".to_string(),
      DailyFilter {
        min_daily_hours: 8.0,
        ..Default::default()
      }
    );
    cfg.save().unwrap();

    let reloaded =
      Config::load(Some(&path)).unwrap();
    assert_eq!(
      reloaded.profiles,
      cfg.profiles
    );
    assert_eq!(
      reloaded.saved_filters,
      cfg.saved_filters
    );
    assert_eq!(
      reloaded.saved_day_filters,
      cfg.saved_day_filters
    );
    assert_eq!(
      reloaded.default_profile,
      "work"
    );
  }
}
