//! A step of the pipeline that turns input files into output files by running external tools.
use crate::process::ToolCommand;
use anyhow::{anyhow, bail, ensure, Context, Error, Result};
use itertools::Itertools;
use log::info;
use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::SystemTime,
};

/// What to do when a stage's outputs already exist.
#[derive(Default, Debug, PartialEq, Eq, Copy, Clone)]
pub enum ExistingOutputs {
    /// Skip stages whose outputs exist and are newer than their inputs; re-run the rest.
    #[default]
    Skip,
    /// Always re-run, replacing any existing outputs.
    Overwrite,
    /// Refuse to run a stage when any of its outputs exist.
    Fail,
}

impl Display for ExistingOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for ExistingOutputs {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ExistingOutputs::Skip),
            "overwrite" => Ok(ExistingOutputs::Overwrite),
            "fail" => Ok(ExistingOutputs::Fail),
            _ => Err(anyhow!("Invalid existing outputs policy: {}", s)),
        }
    }
}

/// How a call to [`StageRunner::run`] ended.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum StageOutcome {
    /// The stage's commands were run and its outputs moved into place.
    Ran,
    /// The stage's outputs were already up to date.
    Skipped,
    /// Dry-run only: the stage's commands were logged but not run.
    Planned,
}

/// Where a stage writes its outputs while its commands are running.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The staged location of a final output path.
    pub fn path(&self, output: &Path) -> PathBuf {
        self.dir.join(output.file_name().unwrap_or(output.as_os_str()))
    }
}

/// A pipeline step: a set of input files, the output files derived from them, and the
/// commands that derive them.
pub trait Stage {
    /// A unique, filename-safe name for the stage.
    fn name(&self) -> String;

    fn inputs(&self) -> Vec<PathBuf>;

    /// The final locations of the stage's outputs.
    fn outputs(&self) -> Vec<PathBuf>;

    /// The commands to run, in order.  Every output must be written to its location in
    /// `staging` rather than its final location.
    fn commands(&self, staging: &Staging) -> Vec<ToolCommand>;
}

/// The directory, inside the state directory, where stages write their outputs before they are
/// moved into place.
pub const STAGING_DIR_NAME: &str = "staging";
/// The directory, inside the state directory, holding the commands each stage last ran with.
pub const COMMANDS_DIR_NAME: &str = "commands";

/// Runs [`Stage`]s, skipping those that are up to date and making sure outputs only appear at
/// their final location once every command of the stage has succeeded.
///
/// A stage is up to date when its outputs are newer than its inputs and it would run exactly the
/// commands recorded by its last successful run.
#[derive(Debug, Clone)]
pub struct StageRunner {
    staging_root: PathBuf,
    commands_dir: PathBuf,
    existing: ExistingOutputs,
    dry_run: bool,
}

impl StageRunner {
    pub fn new(state_dir: &Path, existing: ExistingOutputs, dry_run: bool) -> Self {
        Self {
            staging_root: state_dir.join(STAGING_DIR_NAME),
            commands_dir: state_dir.join(COMMANDS_DIR_NAME),
            existing,
            dry_run,
        }
    }

    pub fn run(&self, stage: &dyn Stage) -> Result<StageOutcome> {
        let name = stage.name();
        let outputs = stage.outputs();
        let staging = Staging::new(self.staging_root.join(&name));
        let commands = stage.commands(&staging);
        let record = commands.iter().map(ToolCommand::command_line).join("\n");
        let record_path = self.commands_dir.join(format!("{name}.cmd"));

        match self.existing {
            ExistingOutputs::Skip => {
                if is_up_to_date(&stage.inputs(), &outputs)? {
                    if read_record(&record_path)?.as_deref() == Some(record.as_str()) {
                        info!("Skipping {name}: outputs are up to date");
                        return Ok(StageOutcome::Skipped);
                    }
                    info!("Re-running {name}: its commands differ from those of its last run");
                }
            }
            ExistingOutputs::Overwrite => (),
            ExistingOutputs::Fail => {
                if let Some(output) = outputs.iter().find(|p| p.exists()) {
                    bail!("Output of {name} already exists: {}", output.display());
                }
            }
        }

        if self.dry_run {
            for command in &commands {
                info!("[dry-run] {name}: {}", command.command_line());
            }
            return Ok(StageOutcome::Planned);
        }

        info!("Running {name}");
        // Left behind by an earlier failed run.
        if staging.dir.exists() {
            fs::remove_dir_all(&staging.dir).with_context(|| {
                format!("Error removing staging directory: {}", staging.dir.display())
            })?;
        }
        fs::create_dir_all(&staging.dir).with_context(|| {
            format!("Error creating staging directory: {}", staging.dir.display())
        })?;

        for command in &commands {
            command.run().with_context(|| format!("{name} failed"))?;
        }

        for output in &outputs {
            let staged = staging.path(output);
            ensure!(
                staged.exists(),
                "{name} completed but did not produce: {}",
                output.display()
            );
        }
        for output in &outputs {
            let staged = staging.path(output);
            fs::rename(&staged, output).with_context(|| {
                format!("Error moving {} to {}", staged.display(), output.display())
            })?;
        }
        fs::remove_dir_all(&staging.dir).with_context(|| {
            format!("Error removing staging directory: {}", staging.dir.display())
        })?;

        fs::create_dir_all(&self.commands_dir).with_context(|| {
            format!("Error creating directory: {}", self.commands_dir.display())
        })?;
        fs::write(&record_path, &record)
            .with_context(|| format!("Error writing: {}", record_path.display()))?;

        Ok(StageOutcome::Ran)
    }

    /// Removes the staging directory once no stage is left in it.
    pub fn finish(&self) -> Result<()> {
        if self.dry_run || !self.staging_root.exists() {
            return Ok(());
        }
        let is_empty = fs::read_dir(&self.staging_root)
            .with_context(|| format!("Error listing: {}", self.staging_root.display()))?
            .next()
            .is_none();
        if is_empty {
            fs::remove_dir(&self.staging_root).with_context(|| {
                format!("Error removing staging directory: {}", self.staging_root.display())
            })?;
        }
        Ok(())
    }
}

/// The commands recorded by a stage's last successful run, if any.
fn read_record(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let record =
        fs::read_to_string(path).with_context(|| format!("Error reading: {}", path.display()))?;
    Ok(Some(record))
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Error reading modification time of: {}", path.display()))
}

/// True when every output exists and none is older than any input.  Inputs that do not exist
/// are ignored.
pub fn is_up_to_date(inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<bool> {
    if outputs.is_empty() || outputs.iter().any(|p| !p.exists()) {
        return Ok(false);
    }
    let mut oldest_output: Option<SystemTime> = None;
    for output in outputs {
        let time = modified(output)?;
        oldest_output = Some(oldest_output.map_or(time, |t| t.min(time)));
    }
    let mut newest_input: Option<SystemTime> = None;
    for input in inputs.iter().filter(|p| p.exists()) {
        let time = modified(input)?;
        newest_input = Some(newest_input.map_or(time, |t| t.max(time)));
    }
    Ok(match (oldest_output, newest_input) {
        (Some(output), Some(input)) => output >= input,
        _ => true,
    })
}
