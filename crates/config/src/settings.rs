//! Persisted user settings (`settings.json`).
//!
//! Holds everything the HTTP API can change at runtime: the backend endpoint
//! and models, retrieval `k`, chunk size, personas, custom template APIs and
//! the code-execution flags. Every mutation is written to disk atomically
//! (temp file + rename).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{BackendDefaults, ConfigError};

/// Id of the persona created on first run.
pub const DEFAULT_PERSONA_ID: &str = "persona-default";

/// Placeholder substituted with the percent-encoded query in API templates.
pub const QUERY_PLACEHOLDER: &str = "$q";

/// A user-selectable assistant persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
}

impl Persona {
    pub fn standard() -> Self {
        Self {
            id: DEFAULT_PERSONA_ID.into(),
            name: "Standard".into(),
            prompt: String::new(),
        }
    }
}

/// A user-added URL template exposed as a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomApi {
    pub id: String,
    pub name: String,
    /// URL containing `$q`
    pub template: String,
    #[serde(default)]
    pub desc: String,
}

/// The contents of `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub version: u32,

    /// Backend root, without trailing `/v1`
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub chat_model: String,

    #[serde(default)]
    pub embed_model: String,

    /// Wikipedia/Wiktionary language
    #[serde(default)]
    pub lang: String,

    #[serde(default)]
    pub theme: String,

    #[serde(default)]
    pub chunk_size: i64,

    #[serde(default)]
    pub k: i64,

    #[serde(default)]
    pub custom_apis: Vec<CustomApi>,

    #[serde(default)]
    pub personas: Vec<Persona>,

    /// Run `exec_code` requests in the sandbox instead of only checking them
    #[serde(default)]
    pub allow_code_exec: bool,

    /// Allow the `sandbox` tool at all
    #[serde(default, alias = "allow_nanogo")]
    pub allow_sandbox: bool,
}

impl Settings {
    pub fn from_defaults(defaults: &BackendDefaults) -> Self {
        Self {
            version: 1,
            base_url: normalize_base_url(&defaults.base_url),
            chat_model: defaults.chat_model.clone(),
            embed_model: defaults.embed_model.clone(),
            lang: defaults.lang.clone(),
            theme: String::new(),
            chunk_size: defaults.chunk_size as i64,
            k: defaults.k as i64,
            custom_apis: Vec::new(),
            personas: vec![Persona::standard()],
            allow_code_exec: false,
            allow_sandbox: false,
        }
    }

    /// Repair values an older or hand-edited file may carry.
    fn repair(&mut self, defaults: &BackendDefaults) {
        if self.version == 0 {
            self.version = 1;
        }
        if self.lang.trim().is_empty() {
            self.lang = defaults.lang.clone();
        }
        if self.chunk_size <= 0 {
            self.chunk_size = defaults.chunk_size as i64;
        }
        if self.k <= 0 {
            self.k = defaults.k as i64;
        }
        self.base_url = normalize_base_url(&self.base_url);
        if self.personas.is_empty() {
            self.personas.push(Persona::standard());
        }
    }

    /// `k` as a positive count.
    pub fn k(&self) -> usize {
        self.k.max(1) as usize
    }

    /// Chunk size as a positive count.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1) as usize
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// The first persona is the global default.
    pub fn default_persona(&self) -> Option<&Persona> {
        self.personas.first()
    }

    pub fn api(&self, id: &str) -> Option<&CustomApi> {
        self.custom_apis.iter().find(|a| a.id == id)
    }
}

/// Trim, drop trailing slashes and a trailing `/v1`.
pub fn normalize_base_url(raw: &str) -> String {
    let url = raw.trim().trim_end_matches('/');
    let url = url.strip_suffix("/v1").unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

/// Thread-safe owner of `settings.json`.
pub struct SettingsStore {
    path: PathBuf,
    inner: Mutex<Settings>,
}

impl SettingsStore {
    /// Load `path`, or create it from `defaults` on first run.
    pub fn load_or_create(path: impl Into<PathBuf>, defaults: &BackendDefaults) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let mut s: Settings = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                s.repair(defaults);
                s
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Creating {} from defaults", path.display());
                Settings::from_defaults(defaults)
            }
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        write_atomic(&path, &settings)?;
        Ok(Self {
            path,
            inner: Mutex::new(settings),
        })
    }

    /// A store that starts from `settings` and persists to `path`.
    pub fn with_settings(path: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A consistent copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    /// Apply `f` and persist. The in-memory copy only changes if the write succeeds.
    pub fn update<F>(&self, f: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.lock();
        let mut next = guard.clone();
        f(&mut next);
        next.base_url = normalize_base_url(&next.base_url);
        write_atomic(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn set_theme(&self, theme: &str) -> Result<(), ConfigError> {
        self.update(|s| s.theme = theme.to_string()).map(|_| ())
    }

    // --- Custom APIs ---

    pub fn apis(&self) -> Vec<CustomApi> {
        self.lock().custom_apis.clone()
    }

    pub fn api(&self, id: &str) -> Option<CustomApi> {
        self.lock().api(id).cloned()
    }

    pub fn add_api(&self, name: &str, template: &str, desc: &str) -> Result<CustomApi, ConfigError> {
        let name = name.trim();
        let template = template.trim();
        if name.is_empty() || template.is_empty() {
            return Err(ConfigError::ValidationError("name and template are required".into()));
        }
        if !template.contains(QUERY_PLACEHOLDER) {
            return Err(ConfigError::ValidationError(format!(
                "template must contain {QUERY_PLACEHOLDER}"
            )));
        }
        let api = CustomApi {
            id: format!("api-{}", unix_nanos()),
            name: name.to_string(),
            template: template.to_string(),
            desc: desc.trim().to_string(),
        };
        let added = api.clone();
        self.update(move |s| s.custom_apis.push(api))?;
        Ok(added)
    }

    pub fn remove_api(&self, id: &str) -> Result<bool, ConfigError> {
        if self.lock().api(id).is_none() {
            return Ok(false);
        }
        self.update(|s| s.custom_apis.retain(|a| a.id != id))?;
        Ok(true)
    }

    // --- Personas ---

    pub fn personas(&self) -> Vec<Persona> {
        self.lock().personas.clone()
    }

    pub fn persona(&self, id: &str) -> Option<Persona> {
        self.lock().persona(id).cloned()
    }

    pub fn default_persona(&self) -> Option<Persona> {
        self.lock().default_persona().cloned()
    }

    pub fn add_persona(&self, name: &str, prompt: &str) -> Result<Persona, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::ValidationError("name required".into()));
        }
        let persona = Persona {
            id: format!("persona-{}", unix_nanos()),
            name: name.to_string(),
            prompt: prompt.trim().to_string(),
        };
        let added = persona.clone();
        self.update(move |s| s.personas.push(persona))?;
        Ok(added)
    }

    /// Remove a persona. The built-in default persona cannot be removed.
    pub fn remove_persona(&self, id: &str) -> Result<bool, ConfigError> {
        if id == DEFAULT_PERSONA_ID {
            return Err(ConfigError::ValidationError("the default persona cannot be deleted".into()));
        }
        if self.lock().persona(id).is_none() {
            return Ok(false);
        }
        self.update(|s| s.personas.retain(|p| p.id != id))?;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write pretty JSON plus newline to `path.tmp`, then rename over `path`.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let write_err = |e: &dyn std::fmt::Display| ConfigError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut body = serde_json::to_string_pretty(value).map_err(|e| write_err(&e))?;
    body.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, body).map_err(|e| write_err(&e))?;
    std::fs::rename(&tmp, path).map_err(|e| write_err(&e))
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::load_or_create(dir.path().join("settings.json"), &BackendDefaults::default()).unwrap()
    }

    #[test]
    fn normalizes_base_urls() {
        assert_eq!(normalize_base_url(" http://localhost:1234/v1/ "), "http://localhost:1234");
        assert_eq!(normalize_base_url("http://host//"), "http://host");
        assert_eq!(normalize_base_url("http://host/api"), "http://host/api");
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn first_run_creates_file_with_default_persona() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.path().exists());
        let s = store.snapshot();
        assert_eq!(s.version, 1);
        assert_eq!(s.personas, vec![Persona::standard()]);
        assert!(!s.allow_code_exec);
        assert!(!s.allow_sandbox);

        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert!(on_disk.ends_with("}\n"));
    }

    #[test]
    fn load_repairs_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"version":0,"base_url":"http://x:1/v1","lang":"","chunk_size":-3,"k":0,"allow_nanogo":true}"#,
        )
        .unwrap();
        let store = SettingsStore::load_or_create(&path, &BackendDefaults::default()).unwrap();
        let s = store.snapshot();
        assert_eq!(s.version, 1);
        assert_eq!(s.base_url, "http://x:1");
        assert_eq!(s.lang, "de");
        assert_eq!(s.chunk_size, 800);
        assert_eq!(s.k, 5);
        assert!(s.allow_sandbox);
        assert_eq!(s.personas.len(), 1);
    }

    #[test]
    fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let result = SettingsStore::load_or_create(&path, &BackendDefaults::default());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn custom_api_requires_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.add_api("Books", "https://example.org/search", "").is_err());

        let api = store.add_api("Books", "https://example.org/search?q=$q", "Book search").unwrap();
        assert!(api.id.starts_with("api-"));
        assert_eq!(store.api(&api.id), Some(api.clone()));

        // survives a reload
        let reloaded = store_in(&dir);
        assert_eq!(reloaded.apis(), vec![api.clone()]);

        assert!(store.remove_api(&api.id).unwrap());
        assert!(!store.remove_api(&api.id).unwrap());
        assert!(store.apis().is_empty());
    }

    #[test]
    fn personas_add_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.add_persona("   ", "x").is_err());

        let pirate = store.add_persona(" Pirate ", " Talk like a pirate. ").unwrap();
        assert_eq!(pirate.name, "Pirate");
        assert_eq!(pirate.prompt, "Talk like a pirate.");
        assert_eq!(store.personas().len(), 2);
        assert_eq!(store.default_persona().unwrap().id, DEFAULT_PERSONA_ID);

        assert!(store.remove_persona(&pirate.id).unwrap());
        assert!(store.remove_persona(DEFAULT_PERSONA_ID).is_err());
    }

    #[test]
    fn update_normalizes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .update(|s| {
                s.base_url = "http://localhost:11434/v1".into();
                s.chat_model = "llama3".into();
            })
            .unwrap();
        let reloaded = store_in(&dir);
        assert_eq!(reloaded.snapshot().base_url, "http://localhost:11434");
        assert_eq!(reloaded.snapshot().chat_model, "llama3");
        assert!(!dir.path().join("settings.json.tmp").exists());
    }
}
