use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

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

pub const SKEDRC_ENV_VAR: &str =
  "SKEDRC";
pub const PORT_ENV_VAR: &str =
  "TODO_PORT";
pub const DATA_ENV_VAR: &str =
  "TODO_DATA";

pub const DEFAULT_PORT: u16 = 7540;
pub const DEFAULT_LIST_LIMIT: usize =
  50;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.sked".to_string()
    );
    map.insert(
      "server.port".to_string(),
      DEFAULT_PORT.to_string()
    );
    map.insert(
      "list.limit".to_string(),
      DEFAULT_LIST_LIMIT.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    skedrc_override
  ))]
  pub fn load(
    skedrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let skedrc = resolve_skedrc_path(
      skedrc_override
    )?;
    if let Some(path) = skedrc {
      info!(skedrc = %path.display(), "loading skedrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no skedrc found; using \
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

  /// Overrides taken from `TODO_PORT`
  /// and `TODO_DATA`.
  pub fn env_overrides()
  -> Vec<(String, String)> {
    [
      (PORT_ENV_VAR, "server.port"),
      (DATA_ENV_VAR, "data.location")
    ]
    .into_iter()
    .filter_map(|(var, key)| {
      let value =
        std::env::var(var).ok()?;
      let value = value.trim();
      if value.is_empty() {
        return None;
      }
      debug!(var, key, "found environment override");
      Some((
        key.to_string(),
        value.to_string()
      ))
    })
    .collect()
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|err| {
        anyhow!(
          "invalid value for {key}: \
           {raw:?} ({err})"
        )
      })
  }

  pub fn port(
    &self
  ) -> anyhow::Result<u16> {
    Ok(
      self
        .get_parsed("server.port")?
        .unwrap_or(DEFAULT_PORT)
    )
  }

  pub fn list_limit(
    &self
  ) -> anyhow::Result<usize> {
    Ok(
      self
        .get_parsed("list.limit")?
        .unwrap_or(DEFAULT_LIST_LIMIT)
    )
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

    let canonical =
      fs::canonicalize(&path)
        .with_context(|| {
          format!(
            "failed to resolve {}",
            path.display()
          )
        })?;
    if self
      .loaded_files
      .contains(&canonical)
    {
      warn!(file = %canonical.display(), "rc file already loaded; skipping repeated include");
      return Ok(());
    }
    self
      .loaded_files
      .push(canonical);

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
fn resolve_skedrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(skedrc_env) =
    std::env::var(SKEDRC_ENV_VAR)
  {
    if skedrc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      skedrc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate = home.join(".skedrc");
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
  Ok(home.join(".sked"))
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

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    DEFAULT_LIST_LIMIT,
    DEFAULT_PORT
  };

  #[test]
  fn defaults_apply_without_file() {
    let cfg = Config::default();
    assert_eq!(
      cfg.port().expect("port"),
      DEFAULT_PORT
    );
    assert_eq!(
      cfg
        .list_limit()
        .expect("limit"),
      DEFAULT_LIST_LIMIT
    );
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("on")
    );
  }

  #[test]
  fn loads_file_with_includes_and_comments()
  {
    let temp =
      tempdir().expect("tempdir");
    let extra =
      temp.path().join("extra.rc");
    fs::write(
      &extra,
      "list.limit = 10\n"
    )
    .expect("write include");
    let main =
      temp.path().join("skedrc");
    fs::write(
      &main,
      "# scheduler settings\n\
       server.port = 8080  # http\n\
       include extra.rc\n\
       include missing.rc\n"
    )
    .expect("write skedrc");

    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(
      cfg.port().expect("port"),
      8080
    );
    assert_eq!(
      cfg
        .list_limit()
        .expect("limit"),
      10
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn include_cycles_load_each_file_once()
  {
    let temp =
      tempdir().expect("tempdir");
    let main =
      temp.path().join("skedrc");
    let other =
      temp.path().join("other.rc");
    fs::write(
      &main,
      "include skedrc\n\
       include other.rc\n\
       server.port = 8081\n"
    )
    .expect("write skedrc");
    fs::write(
      &other,
      "include skedrc\n\
       list.limit = 7\n"
    )
    .expect("write other");

    let cfg = Config::load(Some(&main))
      .expect("load config");
    assert_eq!(
      cfg.port().expect("port"),
      8081
    );
    assert_eq!(
      cfg
        .list_limit()
        .expect("limit"),
      7
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn rejects_lines_without_equals() {
    let temp =
      tempdir().expect("tempdir");
    let main =
      temp.path().join("skedrc");
    fs::write(&main, "server.port\n")
      .expect("write skedrc");

    assert!(
      Config::load(Some(&main)).is_err()
    );
  }

  #[test]
  fn overrides_strip_rc_prefix_and_win()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.server.port".to_string(),
        "9000".to_string()
      ),
      (
        "color".to_string(),
        "off".to_string()
      )
    ]);
    assert_eq!(
      cfg.port().expect("port"),
      9000
    );
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
  }

  #[test]
  fn invalid_port_is_an_error() {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "server.port".to_string(),
      "http".to_string()
    )]);
    assert!(cfg.port().is_err());
  }
}
