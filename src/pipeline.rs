//! Ordered task runner for the crawl -> transform pipeline.
//!
//! Tasks declare the names of the tasks they depend on. The pipeline owns the
//! completion flags: a task is complete once its `run` returned `Ok`. Tasks
//! run one at a time, and the first failure stops the run.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{error, info};

use crate::column_mapping::ColumnMappings;
use crate::config::PipelineConfig;
use crate::crawler::{Crawler, Fetch, HttpFetcher};
use crate::error::{PipelineError, Result};
use crate::transform::{self, TransformSummary};

pub const CRAWL_TASK: &str = "crawl_seasons";
pub const TRANSFORM_TASK: &str = "flatten_matches";

pub trait Task {
    fn name(&self) -> &'static str;

    fn requires(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn run(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

#[derive(Default)]
pub struct Pipeline {
    tasks: Vec<Box<dyn Task>>,
    completed: HashMap<&'static str, bool>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Box<dyn Task>) -> Result<()> {
        let name = task.name();
        if self.completed.contains_key(name) {
            return Err(PipelineError::TaskGraph(format!(
                "task {name:?} registered twice"
            )));
        }
        self.completed.insert(name, false);
        self.tasks.push(task);
        Ok(())
    }

    pub fn is_complete(&self, name: &str) -> bool {
        self.completed.get(name).copied().unwrap_or(false)
    }

    /// Task names in the order `run` would execute them. Among tasks that are
    /// ready at the same time, registration order wins.
    pub fn execution_order(&self) -> Result<Vec<&'static str>> {
        let names = self.tasks.iter().map(|t| t.name()).collect::<HashSet<_>>();
        for task in &self.tasks {
            for dep in task.requires() {
                if !names.contains(dep) {
                    return Err(PipelineError::TaskGraph(format!(
                        "task {:?} requires unknown task {dep:?}",
                        task.name()
                    )));
                }
            }
        }

        let mut order = Vec::with_capacity(self.tasks.len());
        let mut placed = HashSet::new();
        while order.len() < self.tasks.len() {
            let next = self.tasks.iter().find(|t| {
                !placed.contains(t.name()) && t.requires().iter().all(|d| placed.contains(d))
            });
            let Some(task) = next else {
                let stuck = self
                    .tasks
                    .iter()
                    .map(|t| t.name())
                    .filter(|n| !placed.contains(n))
                    .collect::<Vec<_>>();
                return Err(PipelineError::TaskGraph(format!(
                    "dependency cycle among {stuck:?}"
                )));
            };
            placed.insert(task.name());
            order.push(task.name());
        }
        Ok(order)
    }

    /// Runs every incomplete task in dependency order.
    pub fn run(&mut self) -> Result<RunSummary> {
        let order = self.execution_order()?;
        let mut summary = RunSummary::default();

        for name in order {
            if self.is_complete(name) {
                summary.skipped.push(name);
                continue;
            }
            let Some(task) = self.tasks.iter_mut().find(|t| t.name() == name) else {
                continue;
            };
            if let Some(dep) = task
                .requires()
                .into_iter()
                .find(|d| !self.completed.get(d).copied().unwrap_or(false))
            {
                return Err(PipelineError::TaskGraph(format!(
                    "task {name:?} cannot start before {dep:?} completes"
                )));
            }

            info!(task = name, "task started");
            if let Err(err) = task.run() {
                error!(task = name, error = %err, "task failed");
                return Err(err);
            }
            self.completed.insert(name, true);
            info!(task = name, "task complete");
            summary.executed.push(name);
        }

        Ok(summary)
    }
}

pub struct CrawlTask<F> {
    crawler: Crawler<F>,
    output_mode: String,
    output_path: PathBuf,
    pub rows: Option<usize>,
}

impl<F: Fetch> CrawlTask<F> {
    pub fn new(crawler: Crawler<F>, output_mode: impl Into<String>, output_path: PathBuf) -> Self {
        Self {
            crawler,
            output_mode: output_mode.into(),
            output_path,
            rows: None,
        }
    }
}

impl<F: Fetch> Task for CrawlTask<F> {
    fn name(&self) -> &'static str {
        CRAWL_TASK
    }

    fn run(&mut self) -> Result<()> {
        let table = self
            .crawler
            .process_to_output(&self.output_mode, &self.output_path)?;
        self.rows = Some(table.len());
        Ok(())
    }
}

pub struct TransformTask {
    mappings: ColumnMappings,
    input_path: PathBuf,
    output_path: PathBuf,
    pub summary: Option<TransformSummary>,
}

impl TransformTask {
    pub fn new(mappings: ColumnMappings, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            mappings,
            input_path,
            output_path,
            summary: None,
        }
    }
}

impl Task for TransformTask {
    fn name(&self) -> &'static str {
        TRANSFORM_TASK
    }

    fn requires(&self) -> Vec<&'static str> {
        vec![CRAWL_TASK]
    }

    fn run(&mut self) -> Result<()> {
        let summary =
            transform::process_file_to_csv(&self.input_path, &self.output_path, &self.mappings)?;
        info!(
            input_rows = summary.input_rows,
            output_rows = summary.output_rows,
            columns = summary.columns,
            "flattened matches"
        );
        self.summary = Some(summary);
        Ok(())
    }
}

/// Crawl then transform, with paths and limits from `config`.
pub fn football_pipeline<F: Fetch + 'static>(
    fetcher: F,
    config: &PipelineConfig,
    mappings: ColumnMappings,
) -> Result<Pipeline> {
    let combined = config.combined_csv_path();
    let crawler = Crawler::from_config(fetcher, config);

    let mut pipeline = Pipeline::new();
    pipeline.add_task(Box::new(CrawlTask::new(
        crawler,
        config.output_mode.clone(),
        combined.clone(),
    )))?;
    pipeline.add_task(Box::new(TransformTask::new(
        mappings,
        combined,
        config.team_perspective_csv_path(),
    )))?;
    Ok(pipeline)
}

/// `football_pipeline` over the network.
pub fn http_football_pipeline(
    config: &PipelineConfig,
    mappings: ColumnMappings,
) -> Result<Pipeline> {
    let fetcher = HttpFetcher::new(config.http_timeout, config.http_cache)?;
    football_pipeline(fetcher, config, mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        requires: Vec<&'static str>,
        log: Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    }

    impl Task for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn requires(&self) -> Vec<&'static str> {
            self.requires.clone()
        }

        fn run(&mut self) -> Result<()> {
            self.log.borrow_mut().push(self.name);
            if self.fail {
                return Err(PipelineError::Config("boom".to_string()));
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        requires: &[&'static str],
        log: &Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    ) -> Box<dyn Task> {
        Box::new(Recorder {
            name,
            requires: requires.to_vec(),
            log: Rc::clone(log),
            fail,
        })
    }

    #[test]
    fn runs_dependencies_first_regardless_of_registration() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut p = Pipeline::new();
        p.add_task(recorder("b", &["a"], &log, false)).unwrap();
        p.add_task(recorder("a", &[], &log, false)).unwrap();
        let summary = p.run().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert_eq!(summary.executed, vec!["a", "b"]);
        assert!(p.is_complete("a") && p.is_complete("b"));

        let again = p.run().unwrap();
        assert!(again.executed.is_empty());
        assert_eq!(again.skipped, vec!["a", "b"]);
    }

    #[test]
    fn failure_halts_and_leaves_dependents_incomplete() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut p = Pipeline::new();
        p.add_task(recorder("a", &[], &log, true)).unwrap();
        p.add_task(recorder("b", &["a"], &log, false)).unwrap();
        assert!(p.run().is_err());
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(!p.is_complete("a"));
        assert!(!p.is_complete("b"));
    }

    #[test]
    fn rejects_bad_graphs() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut p = Pipeline::new();
        p.add_task(recorder("a", &[], &log, false)).unwrap();
        assert!(p.add_task(recorder("a", &[], &log, false)).is_err());

        let mut p = Pipeline::new();
        p.add_task(recorder("a", &["missing"], &log, false)).unwrap();
        assert!(matches!(p.run(), Err(PipelineError::TaskGraph(_))));

        let mut p = Pipeline::new();
        p.add_task(recorder("a", &["b"], &log, false)).unwrap();
        p.add_task(recorder("b", &["a"], &log, false)).unwrap();
        assert!(matches!(
            p.execution_order(),
            Err(PipelineError::TaskGraph(msg)) if msg.contains("cycle")
        ));
        assert!(log.borrow().is_empty());
    }
}
