//! Configuration of an expansion run and the option schema it is built from

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, ConfigViolation, HookFailure, HookKind, QueueError, QueueResult};
use crate::limits::Limit;
use crate::task::RequeueTerms;

/// A free-form mapping populated by the data collection hooks.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Collects data from a produced value and the arguments that produced it.
pub type CollectTransformedData<A, T> =
    Arc<dyn Fn(&T, &A) -> Result<DataMap, BoxError> + Send + Sync>;

/// Collects data from derived requeue terms, the value they were derived
/// from and that value's arguments.
pub type CollectRequeueData<A, T> =
    Arc<dyn Fn(&RequeueTerms<A>, &T, &A) -> Result<DataMap, BoxError> + Send + Sync>;

/// Decides whether a run should resolve right away.
pub type ShortCircuit<A, T> = Arc<dyn Fn(&T, &RequeueTerms<A>) -> bool + Send + Sync>;

/// The value given for a named option.
pub enum QueueOption<A, T> {
    Limit(i64),
    CollectTransformedData(CollectTransformedData<A, T>),
    CollectRequeueData(CollectRequeueData<A, T>),
    ShortCircuit(ShortCircuit<A, T>),
}

impl<A, T> QueueOption<A, T> {
    pub fn collect_transformed_data<F>(f: F) -> Self
    where
        F: Fn(&T, &A) -> Result<DataMap, BoxError> + Send + Sync + 'static,
    {
        QueueOption::CollectTransformedData(Arc::new(f))
    }

    pub fn collect_requeue_data<F>(f: F) -> Self
    where
        F: Fn(&RequeueTerms<A>, &T, &A) -> Result<DataMap, BoxError> + Send + Sync + 'static,
    {
        QueueOption::CollectRequeueData(Arc::new(f))
    }

    pub fn short_circuit<F>(f: F) -> Self
    where
        F: Fn(&T, &RequeueTerms<A>) -> bool + Send + Sync + 'static,
    {
        QueueOption::ShortCircuit(Arc::new(f))
    }

    fn is_callable(&self) -> bool {
        !matches!(self, QueueOption::Limit(_))
    }
}

impl<A, T> Debug for QueueOption<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueOption::Limit(value) => f.debug_tuple("Limit").field(value).finish(),
            QueueOption::CollectTransformedData(_) => f.write_str("CollectTransformedData(..)"),
            QueueOption::CollectRequeueData(_) => f.write_str("CollectRequeueData(..)"),
            QueueOption::ShortCircuit(_) => f.write_str("ShortCircuit(..)"),
        }
    }
}

/// One positional argument of [`QueueConfig::from_args`].
#[derive(Debug)]
pub enum ConfigArg<A, T> {
    Number(i64),
    Options(Vec<(String, QueueOption<A, T>)>),
}

/// The recognized option names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OptionName {
    MaxDepth,
    MaxResults,
    CollectTransformedData,
    CollectRequeueData,
    ShortCircuit,
}

impl OptionName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "maxDepth" | "max_depth" => Some(OptionName::MaxDepth),
            "maxResults" | "max_results" => Some(OptionName::MaxResults),
            "collectTransformedData" | "collect_transformed_data" => {
                Some(OptionName::CollectTransformedData)
            }
            "collectRequeueData" | "collect_requeue_data" => Some(OptionName::CollectRequeueData),
            "shortCircuit" | "short_circuit" => Some(OptionName::ShortCircuit),
            _ => None,
        }
    }

    fn expects_callable(self) -> bool {
        !matches!(self, OptionName::MaxDepth | OptionName::MaxResults)
    }
}

/// Limits that can be loaded from a configuration file.
///
/// Unknown keys are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueueLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u64>,
}

/// Limits and optional hooks governing one expansion run.
///
/// Hooks are reference counted, so a configuration can be cloned and reused
/// for any number of independent runs.
pub struct QueueConfig<A, T> {
    max_depth: Limit,
    max_results: Limit,
    collect_transformed_data: Option<CollectTransformedData<A, T>>,
    collect_requeue_data: Option<CollectRequeueData<A, T>>,
    short_circuit: Option<ShortCircuit<A, T>>,
}

impl<A, T> Clone for QueueConfig<A, T> {
    fn clone(&self) -> Self {
        Self {
            max_depth: self.max_depth,
            max_results: self.max_results,
            collect_transformed_data: self.collect_transformed_data.clone(),
            collect_requeue_data: self.collect_requeue_data.clone(),
            short_circuit: self.short_circuit.clone(),
        }
    }
}

impl<A, T> Debug for QueueConfig<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("max_depth", &self.max_depth)
            .field("max_results", &self.max_results)
            .field("collect_transformed_data", &self.collect_transformed_data.is_some())
            .field("collect_requeue_data", &self.collect_requeue_data.is_some())
            .field("short_circuit", &self.short_circuit.is_some())
            .finish()
    }
}

impl<A, T> QueueConfig<A, T> {
    fn unbounded() -> Self {
        Self {
            max_depth: Limit::Unbounded,
            max_results: Limit::Unbounded,
            collect_transformed_data: None,
            collect_requeue_data: None,
            short_circuit: None,
        }
    }

    /// Build a configuration from positional arguments.
    ///
    /// Accepts a single depth, a depth and a result count, or a single set of
    /// named options.
    pub fn from_args(args: Vec<ConfigArg<A, T>>) -> QueueResult<Self> {
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.len()) {
            (None, _, _) => Err(QueueError::invalid_argument(ConfigViolation::NoArguments)),
            (Some(ConfigArg::Number(depth)), None, _) => Self::with_depth(depth),
            (Some(ConfigArg::Options(options)), None, _) => Self::from_options(options),
            (Some(ConfigArg::Number(depth)), Some(ConfigArg::Number(results)), 0) => {
                Self::with_depth_and_results(depth, results)
            }
            (Some(first), Some(second), 0) => Err(QueueError::invalid_argument(
                ConfigViolation::InvalidShape(format!(
                    "expected one number, two numbers or an options object, received {} and {}",
                    arg_kind(&first),
                    arg_kind(&second)
                )),
            )),
            (Some(_), Some(_), rest) => Err(QueueError::invalid_argument(
                ConfigViolation::TooManyArguments(rest + 2),
            )),
        }
    }

    /// Bound only the expansion depth.
    pub fn with_depth(max_depth: i64) -> QueueResult<Self> {
        let mut violations = Vec::new();
        let mut config = Self::unbounded();
        config.max_depth = checked_limit("maxDepth", max_depth, &mut violations);
        finish(config, violations)
    }

    /// Bound the expansion depth and the number of admitted tasks.
    pub fn with_depth_and_results(max_depth: i64, max_results: i64) -> QueueResult<Self> {
        let mut violations = Vec::new();
        let mut config = Self::unbounded();
        config.max_depth = checked_limit("maxDepth", max_depth, &mut violations);
        config.max_results = checked_limit("maxResults", max_results, &mut violations);
        finish(config, violations)
    }

    /// Build a configuration from named options, validated in one pass.
    ///
    /// Every unknown, duplicated or mistyped option is reported in a single
    /// [`QueueError::InvalidArgument`].
    pub fn from_options<S: Into<String>>(
        options: impl IntoIterator<Item = (S, QueueOption<A, T>)>,
    ) -> QueueResult<Self> {
        let mut violations = Vec::new();
        let mut seen = HashSet::new();
        let mut config = Self::unbounded();

        for (name, value) in options {
            let name = name.into();
            let Some(option) = OptionName::parse(&name) else {
                violations.push(ConfigViolation::UnknownOption(name));
                continue;
            };
            if !seen.insert(option) {
                violations.push(ConfigViolation::DuplicateOption(name));
                continue;
            }
            if option.expects_callable() != value.is_callable() {
                violations.push(if option.expects_callable() {
                    ConfigViolation::NotCallable(name)
                } else {
                    ConfigViolation::ExpectedLimit(name)
                });
                continue;
            }

            match (option, value) {
                (OptionName::MaxDepth, QueueOption::Limit(value)) => {
                    config.max_depth = checked_limit(&name, value, &mut violations)
                }
                (OptionName::MaxResults, QueueOption::Limit(value)) => {
                    config.max_results = checked_limit(&name, value, &mut violations)
                }
                (OptionName::CollectTransformedData, QueueOption::CollectTransformedData(f)) => {
                    config.collect_transformed_data = Some(f)
                }
                (OptionName::CollectRequeueData, QueueOption::CollectRequeueData(f)) => {
                    config.collect_requeue_data = Some(f)
                }
                (OptionName::ShortCircuit, QueueOption::ShortCircuit(f)) => {
                    config.short_circuit = Some(f)
                }
                // A callable handed to the wrong hook.
                _ => violations.push(ConfigViolation::InvalidShape(format!(
                    "option `{name}` received a function of the wrong kind"
                ))),
            }
        }

        finish(config, violations)
    }

    /// Build a configuration from limits loaded through serde.
    pub fn from_limits(limits: QueueLimits) -> Self {
        let to_limit = |value: Option<u64>| {
            Limit::from(value.map(|value| usize::try_from(value).unwrap_or(usize::MAX)))
        };
        Self {
            max_depth: to_limit(limits.max_depth),
            max_results: to_limit(limits.max_results),
            ..Self::unbounded()
        }
    }

    /// Start a typed builder. Options set through the builder go through the
    /// same validation as [`QueueConfig::from_options`].
    pub fn builder() -> QueueConfigBuilder<A, T> {
        QueueConfigBuilder {
            options: Vec::new(),
        }
    }

    pub fn max_depth(&self) -> Limit {
        self.max_depth
    }

    pub fn max_results(&self) -> Limit {
        self.max_results
    }

    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_depth: self.max_depth.max().map(|max| max as u64),
            max_results: self.max_results.max().map(|max| max as u64),
        }
    }

    /// Run the transformed data hook, if configured.
    pub(crate) fn collect_transformed(
        &self,
        value: &T,
        source_args: &A,
    ) -> Option<Result<DataMap, HookFailure>> {
        let hook = self.collect_transformed_data.as_ref()?;
        Some(hook(value, source_args).map_err(|source| HookFailure {
            hook: HookKind::CollectTransformedData,
            source,
        }))
    }

    /// Run the requeue data hook, if configured.
    pub(crate) fn collect_requeue(
        &self,
        terms: &RequeueTerms<A>,
        value: &T,
        source_args: &A,
    ) -> Option<Result<DataMap, HookFailure>> {
        let hook = self.collect_requeue_data.as_ref()?;
        Some(hook(terms, value, source_args).map_err(|source| HookFailure {
            hook: HookKind::CollectRequeueData,
            source,
        }))
    }

    pub(crate) fn should_short_circuit(&self, value: &T, terms: &RequeueTerms<A>) -> bool {
        self.short_circuit
            .as_ref()
            .is_some_and(|short_circuit| short_circuit(value, terms))
    }
}

/// Typed construction of a [`QueueConfig`].
pub struct QueueConfigBuilder<A, T> {
    options: Vec<(String, QueueOption<A, T>)>,
}

impl<A, T> QueueConfigBuilder<A, T> {
    pub fn max_depth(mut self, max_depth: i64) -> Self {
        self.options.push(("maxDepth".to_string(), QueueOption::Limit(max_depth)));
        self
    }

    pub fn max_results(mut self, max_results: i64) -> Self {
        self.options.push(("maxResults".to_string(), QueueOption::Limit(max_results)));
        self
    }

    pub fn collect_transformed_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &A) -> Result<DataMap, BoxError> + Send + Sync + 'static,
    {
        self.options.push((
            "collectTransformedData".to_string(),
            QueueOption::collect_transformed_data(f),
        ));
        self
    }

    pub fn collect_requeue_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequeueTerms<A>, &T, &A) -> Result<DataMap, BoxError> + Send + Sync + 'static,
    {
        self.options.push((
            "collectRequeueData".to_string(),
            QueueOption::collect_requeue_data(f),
        ));
        self
    }

    pub fn short_circuit<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &RequeueTerms<A>) -> bool + Send + Sync + 'static,
    {
        self.options.push(("shortCircuit".to_string(), QueueOption::short_circuit(f)));
        self
    }

    pub fn build(self) -> QueueResult<QueueConfig<A, T>> {
        QueueConfig::from_options(self.options)
    }
}

/// Statistics of a single run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Tasks admitted, seeds included
    pub admitted: usize,

    /// Values appended to the result
    pub produced: usize,

    /// Branches abandoned because a step failed
    pub failed_branches: usize,

    /// Hook invocations that failed
    pub hook_failures: usize,

    /// Requeue terms dropped because the result limit was reached
    pub dropped_terms: usize,

    /// Maximum number of steps in flight at once
    pub peak_in_flight: usize,

    /// Whether the run resolved through the short-circuit predicate
    pub short_circuited: bool,

    /// Wall time from the start of the run until it resolved
    pub duration: Duration,
}

fn arg_kind<A, T>(arg: &ConfigArg<A, T>) -> &'static str {
    match arg {
        ConfigArg::Number(_) => "number",
        ConfigArg::Options(_) => "options",
    }
}

fn checked_limit(name: &str, value: i64, violations: &mut Vec<ConfigViolation>) -> Limit {
    Limit::from_signed(value).unwrap_or_else(|| {
        violations.push(ConfigViolation::NegativeLimit {
            name: name.to_string(),
            value,
        });
        Limit::Unbounded
    })
}

fn finish<A, T>(
    config: QueueConfig<A, T>,
    violations: Vec<ConfigViolation>,
) -> QueueResult<QueueConfig<A, T>> {
    if violations.is_empty() {
        Ok(config)
    } else {
        Err(QueueError::InvalidArgument { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    type Config = QueueConfig<i64, i64>;

    #[test]
    fn test_positional_shapes() {
        let config = Config::from_args(vec![ConfigArg::Number(2)]).unwrap();
        assert_eq!(config.max_depth(), Limit::Max(2));
        assert_eq!(config.max_results(), Limit::Unbounded);

        let config = Config::from_args(vec![ConfigArg::Number(3), ConfigArg::Number(10)]).unwrap();
        assert_eq!(config.max_depth(), Limit::Max(3));
        assert_eq!(config.max_results(), Limit::Max(10));

        let config = Config::from_args(vec![ConfigArg::Options(vec![(
            "maxResults".to_string(),
            QueueOption::Limit(4),
        )])])
        .unwrap();
        assert_eq!(config.max_depth(), Limit::Unbounded);
        assert_eq!(config.max_results(), Limit::Max(4));
    }

    #[test]
    fn test_invalid_shapes() {
        let err = Config::from_args(vec![]).unwrap_err();
        assert_eq!(err.violations(), &[ConfigViolation::NoArguments]);

        let err = Config::from_args(vec![
            ConfigArg::Number(1),
            ConfigArg::Number(2),
            ConfigArg::Number(3),
        ])
        .unwrap_err();
        assert_eq!(err.violations(), &[ConfigViolation::TooManyArguments(3)]);

        let err = Config::from_args(vec![ConfigArg::Number(1), ConfigArg::Options(vec![])])
            .unwrap_err();
        assert!(matches!(err.violations(), [ConfigViolation::InvalidShape(_)]));
    }

    #[test]
    fn test_all_option_violations_reported_at_once() {
        let err = Config::from_options(vec![
            ("maxDepth", QueueOption::Limit(2)),
            ("max_depth", QueueOption::Limit(3)),
            ("depth", QueueOption::Limit(1)),
            ("shortCircuit", QueueOption::Limit(1)),
            ("maxResults", QueueOption::short_circuit(|_: &i64, _: &RequeueTerms<i64>| true)),
        ])
        .unwrap_err();

        assert!(err.is_invalid_argument());
        assert_eq!(
            err.violations(),
            &[
                ConfigViolation::DuplicateOption("max_depth".to_string()),
                ConfigViolation::UnknownOption("depth".to_string()),
                ConfigViolation::NotCallable("shortCircuit".to_string()),
                ConfigViolation::ExpectedLimit("maxResults".to_string()),
            ]
        );
    }

    #[test]
    fn test_negative_limits_rejected() {
        let err = Config::with_depth_and_results(-1, -2).unwrap_err();
        assert_eq!(
            err.violations(),
            &[
                ConfigViolation::NegativeLimit {
                    name: "maxDepth".to_string(),
                    value: -1
                },
                ConfigViolation::NegativeLimit {
                    name: "maxResults".to_string(),
                    value: -2
                },
            ]
        );
    }

    #[test]
    fn test_mismatched_hook_kind() {
        let err = Config::from_options(vec![(
            "collectRequeueData",
            QueueOption::collect_transformed_data(|_: &i64, _: &i64| Ok(DataMap::new())),
        )])
        .unwrap_err();
        assert!(matches!(err.violations(), [ConfigViolation::InvalidShape(_)]));
    }

    #[test]
    fn test_builder_and_hooks() {
        let config = Config::builder()
            .max_depth(3)
            .collect_transformed_data(|value, _| {
                let mut map = DataMap::new();
                map.insert(value.to_string(), (*value - 1).into());
                Ok(map)
            })
            .short_circuit(|value, _| *value > 100)
            .build()
            .unwrap();

        assert_eq!(config.max_depth(), Limit::Max(3));
        assert!(config.should_short_circuit(&101, &RequeueTerms::Empty));
        assert!(!config.should_short_circuit(&5, &RequeueTerms::Empty));

        let collected = config.collect_transformed(&4, &0).unwrap().unwrap();
        assert_eq!(collected.get("4"), Some(&serde_json::json!(3)));
        assert!(config.collect_requeue(&RequeueTerms::Empty, &4, &0).is_none());

        // Configurations are reusable.
        let copy = config.clone();
        assert_eq!(copy.limits(), config.limits());
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = Config::builder().max_depth(1).max_depth(2).build().unwrap_err();
        assert_eq!(
            err.violations(),
            &[ConfigViolation::DuplicateOption("maxDepth".to_string())]
        );
    }

    #[test]
    fn test_limits_from_serde() {
        let limits: QueueLimits = serde_json::from_str(r#"{"maxDepth": 2}"#).unwrap();
        let config = Config::from_limits(limits);
        assert_eq!(config.max_depth(), Limit::Max(2));
        assert_eq!(config.max_results(), Limit::Unbounded);
        assert_eq!(serde_json::to_string(&config.limits()).unwrap(), r#"{"maxDepth":2}"#);

        assert!(serde_json::from_str::<QueueLimits>(r#"{"maxDepth": 2, "depth": 1}"#).is_err());
    }
}
