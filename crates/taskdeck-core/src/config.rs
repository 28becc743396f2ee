use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::gateway::RemoteSettings;
use crate::sort::SortKey;

pub const RC_ENV: &str = "TASKDECKRC";

/// Which gateway pair serves the
/// records.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Backend {
  Memory,
  Remote
}

impl FromStr for Backend {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "memory" | "mock" => {
        Ok(Backend::Memory)
      }
      | "remote" => Ok(Backend::Remote),
      | other => Err(anyhow!(
        "unknown backend: {other}"
      ))
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.taskdeck"),
      ("backend", "memory"),
      ("memory.latency_ms", "0"),
      ("remote.timeout_secs", "30"),
      ("remote.tasks_table", "Tasks"),
      (
        "remote.categories_table",
        "Categories"
      ),
      ("default.sort", "order"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskdeckrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no taskdeckrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn get_u64(
    &self,
    key: &str
  ) -> anyhow::Result<Option<u64>> {
    self
      .map
      .get(key)
      .map(|v| {
        v.trim().parse::<u64>().with_context(
          || {
            format!(
              "{key} must be a whole \
               number, got {v:?}"
            )
          }
        )
      })
      .transpose()
  }

  pub fn backend(
    &self
  ) -> anyhow::Result<Backend> {
    self
      .get("backend")
      .as_deref()
      .unwrap_or("memory")
      .parse()
  }

  pub fn memory_latency(
    &self
  ) -> anyhow::Result<Duration> {
    Ok(Duration::from_millis(
      self
        .get_u64("memory.latency_ms")?
        .unwrap_or(0)
    ))
  }

  pub fn default_sort(
    &self
  ) -> anyhow::Result<SortKey> {
    self
      .get("default.sort")
      .as_deref()
      .unwrap_or("order")
      .parse()
  }

  pub fn color_enabled(&self) -> bool {
    self
      .get_bool("color")
      .unwrap_or(true)
  }

  /// Remote connection settings;
  /// `remote.url` is mandatory.
  pub fn remote_settings(
    &self
  ) -> anyhow::Result<RemoteSettings> {
    let base_url = self
      .get("remote.url")
      .filter(|v| !v.trim().is_empty())
      .ok_or_else(|| {
        anyhow!(
          "backend=remote requires \
           remote.url"
        )
      })?;
    let defaults =
      RemoteSettings::default();
    let timeout = self
      .get_u64("remote.timeout_secs")?
      .map(Duration::from_secs)
      .unwrap_or(defaults.timeout);

    Ok(RemoteSettings {
      base_url,
      project_id: self
        .get("remote.project_id")
        .unwrap_or_default(),
      public_key: self
        .get("remote.public_key")
        .unwrap_or_default(),
      timeout,
      tasks_table: self
        .get("remote.tasks_table")
        .unwrap_or(defaults.tasks_table),
      categories_table: self
        .get("remote.categories_table")
        .unwrap_or(
          defaults.categories_table
        )
    })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
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

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate =
    home.join(".taskdeckrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskdeck"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
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

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use super::{
    Backend,
    Config
  };
  use crate::sort::SortKey;

  #[test]
  fn defaults_pick_memory_backend() {
    let cfg = Config::default();
    assert_eq!(
      cfg.backend().unwrap(),
      Backend::Memory
    );
    assert_eq!(
      cfg.memory_latency().unwrap(),
      Duration::ZERO
    );
    assert_eq!(
      cfg.default_sort().unwrap(),
      SortKey::Order
    );
    assert!(cfg.color_enabled());
    assert!(cfg.remote_settings().is_err());
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp = tempfile::tempdir().unwrap();
    let rc = temp.path().join("taskdeckrc");
    let extra =
      temp.path().join("remote.rc");
    fs::write(
      &rc,
      "# main file\nbackend = remote \
       # trailing\ninclude remote.rc\n\
       default.sort=priority\n"
    )
    .unwrap();
    fs::write(
      &extra,
      "remote.url = https://api.example.test/\n\
       remote.project_id = p1\n\
       remote.timeout_secs = 5\n"
    )
    .unwrap();

    let mut cfg =
      Config::load(Some(&rc)).unwrap();
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.backend().unwrap(),
      Backend::Remote
    );

    let remote =
      cfg.remote_settings().unwrap();
    assert_eq!(
      remote.base_url,
      "https://api.example.test/"
    );
    assert_eq!(remote.project_id, "p1");
    assert_eq!(
      remote.timeout,
      Duration::from_secs(5)
    );
    assert_eq!(remote.tasks_table, "Tasks");

    cfg.apply_overrides([(
      "rc.default.sort".to_string(),
      "due".to_string()
    )]);
    assert_eq!(
      cfg.default_sort().unwrap(),
      SortKey::DueDate
    );
  }

  #[test]
  fn bad_numbers_are_reported() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "memory.latency_ms".to_string(),
      "soon".to_string()
    )]);
    let err =
      cfg.memory_latency().unwrap_err();
    assert!(
      err
        .to_string()
        .contains("memory.latency_ms")
    );
  }
}
