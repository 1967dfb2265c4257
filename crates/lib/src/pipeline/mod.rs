//! The build pipeline.
//!
//! One build runs these stages strictly in order:
//!
//! ```text
//! Init → Resolve → Download → Configure → BeforeInstallHook → ApplyPatches
//!      → Compile → Install → CleanObjects → WriteIni → CommentExtensionDir
//!      → AfterInstallHook → InstallExtensions → Done
//! ```
//!
//! Every stage except `ApplyPatches` is fail-fast. Whatever ends the run
//! early (a failing step or a shutdown signal) goes through the same exit
//! path in [`Pipeline::run`]: any running child is killed, `make clean` runs
//! in the source tree, and the caller gets a [`BuildFailure`] carrying the
//! log tail and the exit status to use. The success path never enters it.

pub mod configure;
pub mod hooks;
pub mod install;
pub mod patch;
pub mod types;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::config::BuildConfig;
use crate::consts::LOG_TAIL_LINES;
use crate::definition::{Registry, definition_name};
use crate::download::download_package;
use crate::execute::{BuildLog, Cmd, CommandRunner};
use crate::extension::{Catalog, ExtensionOutcome, ExtensionRequest, PeclInstaller, install_all, parse_spec};
use crate::lua::ScriptContext;
use crate::lua::runtime::{create_runtime, load_file};
use crate::plugin::{self, Capability, EXTENSION_PLUGIN, PluginExtensionInstaller, PluginRegistry};
use crate::settings::Settings;
use crate::transport::Transport;

use configure::HostFlags;
use hooks::HookEnv;

pub use patch::PatchOutcome;
pub use types::{BuildError, BuildFailure, BuildReport, BuildRequest, CleanupOutcome, Signal, Stage};

/// What the failure path needs to know about a run in progress.
#[derive(Debug)]
struct RunState {
  stage: Cell<Stage>,
  log: RefCell<Option<Rc<BuildLog>>>,
  source_dir: RefCell<Option<PathBuf>>,
}

impl RunState {
  fn new() -> Self {
    Self {
      stage: Cell::new(Stage::Init),
      log: RefCell::new(None),
      source_dir: RefCell::new(None),
    }
  }

  fn enter(&self, stage: Stage) {
    debug!(%stage, "entering stage");
    self.stage.set(stage);
    if let Some(log) = self.log.borrow().as_ref() {
      let _ = log.section(stage.as_str());
    }
  }
}

/// A single build of one definition into one prefix.
pub struct Pipeline<T: Transport> {
  settings: Settings,
  transport: T,
  request: BuildRequest,
  host: HostFlags,
}

impl<T: Transport> Pipeline<T> {
  pub fn new(settings: Settings, transport: T, request: BuildRequest) -> Self {
    Self {
      settings,
      transport,
      request,
      host: HostFlags::detect(),
    }
  }

  /// Override host detection (tests, cross checks).
  pub fn with_host(mut self, host: HostFlags) -> Self {
    self.host = host;
    self
  }

  /// Run the build until it finishes, fails, or `shutdown` resolves.
  pub async fn run(self, shutdown: impl Future<Output = Signal>) -> Result<BuildReport, BuildFailure> {
    let state = RunState::new();

    let outcome = tokio::select! {
      biased;
      signal = shutdown => {
        warn!(%signal, "build interrupted");
        Err(BuildError::Interrupted(signal))
      }
      result = self.execute(&state) => result,
    };

    match outcome {
      Ok(report) => {
        info!(
          definition = %report.definition,
          prefix = %report.prefix.display(),
          "build finished"
        );
        Ok(report)
      }
      Err(error) => Err(self.fail(&state, error).await),
    }
  }

  async fn execute(&self, state: &RunState) -> Result<BuildReport, BuildError> {
    let settings = &self.settings;
    let prefix = self.request.prefix.as_path();

    state.enter(Stage::Resolve);
    let registry = Registry::new(&settings.definition_path);
    let definition_path = registry
      .resolve(&self.request.definition)
      .map_err(|_| BuildError::DefinitionNotFound(self.request.definition.clone()))?;
    let definition = definition_name(&definition_path);

    let log = Rc::new(BuildLog::create(&settings.tmp_dir, &definition)?);
    *state.log.borrow_mut() = Some(log.clone());
    let _ = log.section(Stage::Resolve.as_str());
    info!(definition = %definition, log = %log.path().display(), "building");

    let runner = Rc::new(CommandRunner::new(log.clone()));
    let shared = Rc::new(RefCell::new(BuildConfig::with_defaults(prefix, settings)?));
    let plugins = Rc::new(RefCell::new(PluginRegistry::default()));

    // Plugin callbacks belong to this VM; it lives until the build ends.
    let lua = create_runtime(ScriptContext {
      config: shared.clone(),
      plugins: plugins.clone(),
      runner: runner.clone(),
      definition: definition.clone(),
      root: settings.root.clone(),
    })
    .map_err(|e| BuildError::Script {
      path: definition_path.clone(),
      message: e.to_string(),
    })?;

    let plugin_status = plugin::load_all(&lua, &settings.plugins_dir()).await?;
    load_file(&lua, &definition_path).await.map_err(|e| BuildError::Script {
      path: definition_path.clone(),
      message: e.to_string(),
    })?;

    let config = {
      let mut config = shared.borrow_mut();
      if let Some(spec) = &settings.install_extension {
        for request in parse_spec(spec) {
          config.add_extension(request);
        }
      }
      if let Some(ini) = &self.request.ini {
        config.set_ini(ini.clone());
      }
      config.clone()
    };
    let package = config
      .package()
      .cloned()
      .ok_or_else(|| BuildError::NoPackage(definition.clone()))?;

    state.enter(Stage::Download);
    let source_dir = settings.source_root().join(&definition);
    let download = download_package(&self.transport, &package, &settings.packages_dir(), &source_dir).await?;
    *state.source_dir.borrow_mut() = Some(source_dir.clone());

    state.enter(Stage::Configure);
    configure::configure(&runner, &config, settings, &definition, &source_dir, self.host).await?;

    let hook_env = HookEnv {
      prefix,
      source_dir: &source_dir,
      root: &settings.root,
    };

    state.enter(Stage::BeforeInstallHook);
    let mut triggers = hooks::run_triggers(&runner, &settings.before_install_dir(), &hook_env).await?;
    hooks::run_plugins(&plugins, Capability::BeforeInstall, Stage::BeforeInstallHook, &hook_env).await?;

    state.enter(Stage::ApplyPatches);
    let patches = patch::apply_all(&runner, &settings.tools.patch, config.patches(), &source_dir).await;

    state.enter(Stage::Compile);
    let make = || Cmd::tool(&settings.tools.make).cwd(&source_dir);
    runner
      .run(&make().args(config.make_args().iter().cloned()))
      .await
      .map_err(BuildError::Compile)?;

    state.enter(Stage::Install);
    runner
      .run(&make().arg("install"))
      .await
      .map_err(BuildError::Install)?;
    install::fixup_binaries(&prefix.join("bin"), self.host.os.is_some_and(|os| os.is_darwin()))?;

    state.enter(Stage::CleanObjects);
    if settings.keep_object_files {
      debug!("keeping object files");
    } else {
      runner.run(&make().arg("clean")).await.map_err(BuildError::Clean)?;
    }

    state.enter(Stage::WriteIni);
    let ini = install::write_ini(&source_dir, prefix, config.ini())?;

    state.enter(Stage::CommentExtensionDir);
    if let Some(ini) = &ini {
      if install::comment_extension_dir(ini)? {
        info!(ini = %ini.display(), "commented out extension_dir");
      }
    }

    state.enter(Stage::AfterInstallHook);
    triggers.extend(hooks::run_triggers(&runner, &settings.after_install_dir(), &hook_env).await?);
    hooks::run_plugins(&plugins, Capability::AfterInstall, Stage::AfterInstallHook, &hook_env).await?;

    state.enter(Stage::InstallExtensions);
    let extensions = self.install_extensions(&runner, &plugins, config.extensions()).await;

    state.enter(Stage::Done);

    Ok(BuildReport {
      definition,
      definition_path,
      prefix: prefix.to_path_buf(),
      log_path: log.path().to_path_buf(),
      download,
      plugins: plugin_status,
      triggers,
      patches,
      ini,
      extensions,
    })
  }

  async fn install_extensions(
    &self,
    runner: &CommandRunner,
    plugins: &RefCell<PluginRegistry>,
    requests: &[ExtensionRequest],
  ) -> Vec<ExtensionOutcome> {
    if requests.is_empty() {
      return Vec::new();
    }

    let delegate = plugins.borrow().get(EXTENSION_PLUGIN).cloned();
    if let Some(installer) = delegate.and_then(PluginExtensionInstaller::new) {
      info!(plugin = EXTENSION_PLUGIN, "delegating extension installs to plugin");
      return install_all(&installer, requests).await;
    }

    let catalog = Catalog::load(&self.settings.extension_catalog()).unwrap_or_else(|e| {
      warn!(error = %e, "ignoring unreadable extension catalog");
      Catalog::default()
    });
    let installer = PeclInstaller::new(&self.transport, runner, catalog, &self.request.prefix, &self.settings);
    install_all(&installer, requests).await
  }

  /// The single exit path for failed and cancelled runs.
  async fn fail(&self, state: &RunState, error: BuildError) -> BuildFailure {
    let stage = state.stage.get();
    error!(%stage, error = %error, "build failed");

    let log = state.log.borrow().clone();
    let source_dir = state.source_dir.borrow().clone();
    if let Some(log) = &log {
      let _ = log.write_line(&format!("\nbuild failed during {}: {}", stage, error));
    }

    let cleanup = match (&log, &source_dir) {
      (Some(log), Some(dir)) => self.cleanup(log.clone(), dir).await,
      _ => CleanupOutcome::Skipped,
    };

    let log_tail = log
      .as_ref()
      .and_then(|l| l.tail(LOG_TAIL_LINES).ok())
      .unwrap_or_default();

    BuildFailure {
      error,
      stage,
      log_path: log.map(|l| l.path().to_path_buf()),
      log_tail,
      cleanup,
    }
  }

  /// Best-effort `make clean` in a configured source tree.
  async fn cleanup(&self, log: Rc<BuildLog>, source_dir: &Path) -> CleanupOutcome {
    if !source_dir.join("Makefile").is_file() {
      return CleanupOutcome::Skipped;
    }

    warn!(source = %source_dir.display(), "cleaning up source tree");
    let runner = CommandRunner::new(log);
    let clean = Cmd::tool(&self.settings.tools.make).arg("clean").cwd(source_dir);
    match runner.run(&clean).await {
      Ok(()) => CleanupOutcome::Cleaned,
      Err(e) => {
        warn!(error = %e, "cleanup failed");
        CleanupOutcome::Failed(e.to_string())
      }
    }
  }
}
