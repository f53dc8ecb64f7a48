//! Embedded plugins written in Rhai.
//!
//! A script plugin is a `.rhai` file whose entry point receives a `Plugin`
//! object and returns `true` on success:
//!
//! ```rhai
//! fn entry_point(plugin) {
//!     plugin.add_browser("com.example.radio", #{
//!         name: "Radio",
//!         handle_request: |payload| `{"items":[]}`,
//!     });
//!     true
//! }
//! ```
//!
//! Browser handlers get the request payload as a string and answer with a
//! string (sent as is), a map or array (sent as JSON), `true` (an empty
//! response) or `false`. A handler that returns `()` rejects the request
//! like `false`, since the script has no way to complete it later. Player maps provide `play`
//! and optionally `set_state`, `set_position`, `get_position`, `bind` and
//! `configure`.
//!
//! Scripts log through `log(level, message)` with numeric levels (10 debug
//! up to 50 critical), the `log_debug`/`log_info`/`log_warn`/`log_error`
//! helpers, `print` and `debug`. Records go to `tracing` under the
//! `tunehub::script` target.

use crate::error::PluginError;
use crate::plugin::Plugin;
use rhai::{Dynamic, Engine, FnPtr, FuncArgs, Map, NativeCallContext, Scope, Variant, AST};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tunehub_core::{Browser, BrowserInfo, Message, Request};
use tunehub_player::{Player, PlayerHandle, PlayerInfo, PlayerState};

pub const SCRIPT_LOG_TARGET: &str = "tunehub::script";
pub const SCRIPT_EXTENSION: &str = "rhai";

/// Severity of a script log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl ScriptLogLevel {
    /// Classify a numeric level: up to 10 is debug, 20 info, 30 warning,
    /// 40 error and anything above is critical.
    pub fn classify(level: i64) -> Self {
        match level {
            i64::MIN..=10 => ScriptLogLevel::Debug,
            11..=20 => ScriptLogLevel::Info,
            21..=30 => ScriptLogLevel::Warning,
            31..=40 => ScriptLogLevel::Error,
            _ => ScriptLogLevel::Critical,
        }
    }
}

fn forward(level: ScriptLogLevel, plugin: Option<&str>, message: &str) {
    let plugin = plugin.unwrap_or("script");
    match level {
        ScriptLogLevel::Debug => tracing::debug!(target: SCRIPT_LOG_TARGET, plugin, "{message}"),
        ScriptLogLevel::Info => tracing::info!(target: SCRIPT_LOG_TARGET, plugin, "{message}"),
        ScriptLogLevel::Warning => tracing::warn!(target: SCRIPT_LOG_TARGET, plugin, "{message}"),
        ScriptLogLevel::Error => tracing::error!(target: SCRIPT_LOG_TARGET, plugin, "{message}"),
        ScriptLogLevel::Critical => {
            tracing::error!(target: SCRIPT_LOG_TARGET, plugin, critical = true, "{message}")
        }
    }
}

/// The process-wide script engine.
pub struct ScriptRuntime {
    engine: Arc<Engine>,
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRuntime {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.on_print(|text| forward(ScriptLogLevel::Info, None, text));
        engine.on_debug(|text, source, _pos| forward(ScriptLogLevel::Debug, source, text));

        engine.register_fn("log", |ctx: NativeCallContext, level: i64, message: &str| {
            forward(ScriptLogLevel::classify(level), ctx.source(), message)
        });
        engine.register_fn("log_debug", |ctx: NativeCallContext, message: &str| {
            forward(ScriptLogLevel::Debug, ctx.source(), message)
        });
        engine.register_fn("log_info", |ctx: NativeCallContext, message: &str| {
            forward(ScriptLogLevel::Info, ctx.source(), message)
        });
        engine.register_fn("log_warn", |ctx: NativeCallContext, message: &str| {
            forward(ScriptLogLevel::Warning, ctx.source(), message)
        });
        engine.register_fn("log_error", |ctx: NativeCallContext, message: &str| {
            forward(ScriptLogLevel::Error, ctx.source(), message)
        });

        engine
            .register_type_with_name::<ScriptPlugin>("Plugin")
            .register_get("name", |plugin: &mut ScriptPlugin| plugin.plugin.name().to_string())
            .register_fn("add_browser", ScriptPlugin::add_browser)
            .register_fn("add_player", ScriptPlugin::add_player)
            .register_fn("remove_browser", ScriptPlugin::remove_browser)
            .register_fn("remove_player", ScriptPlugin::remove_player);

        engine
            .register_type_with_name::<PlayerHandle>("PlayerHandle")
            .register_fn("eos", |handle: &mut PlayerHandle| handle.eos())
            .register_fn("error", |handle: &mut PlayerHandle, message: &str| handle.error(message))
            .register_fn("update_state", |handle: &mut PlayerHandle, state: &str| {
                if let Some(state) = parse_state(state) {
                    handle.update_state(state);
                }
            })
            .register_fn("update_position", |handle: &mut PlayerHandle, position: i64| {
                handle.update_position(to_millis(position))
            })
            .register_fn(
                "update_duration",
                |handle: &mut PlayerHandle, position: i64, duration: i64| {
                    handle.update_duration(to_millis(position), to_millis(duration))
                },
            );

        Self {
            engine: Arc::new(engine),
        }
    }

    /// Compile the plugin's script and run its entry point.
    pub(crate) fn load(&self, plugin: &Plugin) -> Result<ScriptModule, PluginError> {
        let manifest = plugin.manifest();
        let path = script_path(plugin.dir(), &manifest.artifact_filename);
        if !path.is_file() {
            return Err(PluginError::ArtifactMissing { path });
        }
        let mut ast = self
            .engine
            .compile_file(path.clone())
            .map_err(|err| PluginError::ScriptCompile {
                path: path.clone(),
                message: err.to_string(),
            })?;
        ast.set_source(manifest.name.as_str());
        let ast = Arc::new(ast);

        let context = ScriptPlugin {
            plugin: plugin.clone(),
            script: ScriptContext {
                plugin: manifest.name.clone(),
                engine: self.engine.clone(),
                ast: ast.clone(),
            },
        };
        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<bool>(&mut scope, &ast, &manifest.entry_point, (context,));
        match result {
            Ok(true) => Ok(ScriptModule {
                name: manifest.name.clone(),
                path,
                _ast: ast,
            }),
            Ok(false) => {
                plugin.rollback();
                Err(PluginError::EntryPointFailed {
                    name: manifest.name.clone(),
                })
            }
            Err(err) => {
                plugin.rollback();
                Err(PluginError::ScriptEntryPoint {
                    name: manifest.entry_point.clone(),
                    message: err.to_string(),
                })
            }
        }
    }
}

/// `artifact` inside `dir`, with the script extension added when missing.
fn script_path(dir: &Path, artifact: &str) -> PathBuf {
    let path = dir.join(artifact);
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(SCRIPT_EXTENSION)
    }
}

/// A loaded script plugin.
pub struct ScriptModule {
    name: String,
    path: PathBuf,
    _ast: Arc<AST>,
}

impl ScriptModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Clone)]
struct ScriptContext {
    plugin: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl ScriptContext {
    fn call<T: Variant + Clone>(&self, function: &FnPtr, args: impl FuncArgs) -> Option<T> {
        match function.call::<T>(&self.engine, &self.ast, args) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    target: SCRIPT_LOG_TARGET,
                    plugin = %self.plugin,
                    function = function.fn_name(),
                    error = %err,
                    "script callback failed"
                );
                None
            }
        }
    }

    fn configure(&self, function: Option<&FnPtr>, settings: &toml::Table) {
        let Some(function) = function else {
            return;
        };
        match rhai::serde::to_dynamic(settings) {
            Ok(settings) => {
                self.call::<Dynamic>(function, (settings,));
            }
            Err(err) => {
                tracing::warn!(plugin = %self.plugin, error = %err, "cannot pass settings to script")
            }
        }
    }
}

/// The `Plugin` object seen by scripts.
#[derive(Clone)]
struct ScriptPlugin {
    plugin: Plugin,
    script: ScriptContext,
}

impl ScriptPlugin {
    fn add_browser(&mut self, id: &str, def: Map) -> bool {
        let Some(handler) = callback(&def, "handle_request") else {
            tracing::warn!(plugin = %self.script.plugin, browser_id = id, "browser has no handle_request");
            return false;
        };
        let browser = ScriptBrowser {
            info: BrowserInfo {
                name: text(&def, "name").unwrap_or_else(|| id.to_string()),
                description: text(&def, "description").unwrap_or_default(),
                icon: text(&def, "icon"),
                supports_search: flag(&def, "supports_search"),
            },
            handler,
            configure: callback(&def, "configure"),
            script: self.script.clone(),
        };
        self.plugin.add_browser(id, Arc::new(browser)).is_ok()
    }

    fn add_player(&mut self, id: &str, def: Map) -> bool {
        let Some(play) = callback(&def, "play") else {
            tracing::warn!(plugin = %self.script.plugin, player_id = id, "player has no play");
            return false;
        };
        let player = ScriptPlayer {
            info: PlayerInfo {
                name: text(&def, "name").unwrap_or_else(|| id.to_string()),
                description: text(&def, "description").unwrap_or_default(),
                icon: text(&def, "icon"),
            },
            play,
            set_state: callback(&def, "set_state"),
            set_position: callback(&def, "set_position"),
            get_position: callback(&def, "get_position"),
            bind: callback(&def, "bind"),
            configure: callback(&def, "configure"),
            script: self.script.clone(),
        };
        self.plugin.add_player(id, Arc::new(player)).is_ok()
    }

    fn remove_browser(&mut self, id: &str) -> bool {
        self.plugin.remove_browser(id).is_ok()
    }

    fn remove_player(&mut self, id: &str) -> bool {
        self.plugin.remove_player(id).is_ok()
    }
}

struct ScriptBrowser {
    info: BrowserInfo,
    handler: FnPtr,
    configure: Option<FnPtr>,
    script: ScriptContext,
}

impl Browser for ScriptBrowser {
    fn info(&self) -> BrowserInfo {
        self.info.clone()
    }

    fn handle_request(&self, request: Request) -> bool {
        let payload = request.message().to_text();
        match self.script.call::<Dynamic>(&self.handler, (payload,)) {
            Some(answer) => respond(&request, answer),
            None => false,
        }
    }

    fn configure(&self, settings: &toml::Table) {
        self.script.configure(self.configure.as_ref(), settings);
    }
}

fn respond(request: &Request, answer: Dynamic) -> bool {
    if answer.is_unit() {
        tracing::debug!("script browser returned no answer");
        return false;
    }
    if let Ok(accepted) = answer.as_bool() {
        if accepted {
            request.complete(Message::from(""));
        }
        return accepted;
    }
    let response = match answer.clone().into_string() {
        Ok(text) => Message::from(text),
        Err(_) => match serde_json::to_vec(&answer) {
            Ok(json) => Message::from(json),
            Err(err) => {
                tracing::warn!(error = %err, "script response is not serializable");
                return false;
            }
        },
    };
    request.complete(response);
    true
}

struct ScriptPlayer {
    info: PlayerInfo,
    play: FnPtr,
    set_state: Option<FnPtr>,
    set_position: Option<FnPtr>,
    get_position: Option<FnPtr>,
    bind: Option<FnPtr>,
    configure: Option<FnPtr>,
    script: ScriptContext,
}

impl Player for ScriptPlayer {
    fn info(&self) -> PlayerInfo {
        self.info.clone()
    }

    fn play(&self, path: &str) -> bool {
        self.script
            .call::<bool>(&self.play, (path.to_string(),))
            .unwrap_or(false)
    }

    fn set_state(&self, state: PlayerState) -> bool {
        match &self.set_state {
            Some(function) => self
                .script
                .call::<bool>(function, (state_name(state).to_string(),))
                .unwrap_or(false),
            None => true,
        }
    }

    fn set_position(&self, position_ms: u32) -> bool {
        self.set_position.as_ref().is_some_and(|function| {
            self.script
                .call::<bool>(function, (i64::from(position_ms),))
                .unwrap_or(false)
        })
    }

    fn position(&self) -> u32 {
        self.get_position
            .as_ref()
            .and_then(|function| self.script.call::<i64>(function, ()))
            .map_or(0, to_millis)
    }

    fn bind(&self, handle: PlayerHandle) {
        if let Some(function) = &self.bind {
            self.script.call::<Dynamic>(function, (handle,));
        }
    }

    fn configure(&self, settings: &toml::Table) {
        self.script.configure(self.configure.as_ref(), settings);
    }
}

fn callback(def: &Map, key: &str) -> Option<FnPtr> {
    def.get(key).and_then(|value| value.clone().try_cast::<FnPtr>())
}

fn text(def: &Map, key: &str) -> Option<String> {
    def.get(key).and_then(|value| value.clone().into_string().ok())
}

fn flag(def: &Map, key: &str) -> bool {
    def.get(key)
        .and_then(|value| value.as_bool().ok())
        .unwrap_or(false)
}

fn state_name(state: PlayerState) -> &'static str {
    match state {
        PlayerState::None => "none",
        PlayerState::Playing => "playing",
        PlayerState::Paused => "paused",
        PlayerState::Stopped => "stopped",
    }
}

fn parse_state(name: &str) -> Option<PlayerState> {
    match name {
        "none" => Some(PlayerState::None),
        "playing" => Some(PlayerState::Playing),
        "paused" => Some(PlayerState::Paused),
        "stopped" => Some(PlayerState::Stopped),
        _ => None,
    }
}

fn to_millis(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
