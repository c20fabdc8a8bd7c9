//! Accumulation of produced values into the final result of a run

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::DataMap;

/// Everything a run produced.
///
/// Serializes as `{all, byLayer, transformedDataMap?, requeueTermsMap?}`;
/// the two maps are only present when a hook populated them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionResult<A, T> {
    /// Every produced value, in completion order
    pub all: Vec<T>,

    /// Produced values grouped by layer, each in completion order
    pub by_layer: BTreeMap<usize, Vec<T>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed_data_map: Option<DataMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub requeue_terms_map: Option<DataMap>,

    /// The arguments that produced each entry of `all`, index for index
    #[serde(skip)]
    pub sources: Vec<A>,
}

impl<A, T> Default for ExpansionResult<A, T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            by_layer: BTreeMap::new(),
            transformed_data_map: None,
            requeue_terms_map: None,
            sources: Vec::new(),
        }
    }
}

impl<A, T> ExpansionResult<A, T> {
    /// The result of a run that admitted nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// The values produced at `layer`, empty if the run never reached it
    pub fn layer(&self, layer: usize) -> &[T] {
        self.by_layer.get(&layer).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterate over produced values together with the arguments that
    /// produced them
    pub fn iter_with_sources(&self) -> impl Iterator<Item = (&T, &A)> {
        self.all.iter().zip(self.sources.iter())
    }
}

/// Accumulates produced values and collected hook data during a run.
#[derive(Debug)]
pub struct ResultAggregator<A, T> {
    all: Vec<T>,
    sources: Vec<A>,
    by_layer: BTreeMap<usize, Vec<T>>,
    transformed_data_map: DataMap,
    requeue_terms_map: DataMap,
}

impl<A, T> Default for ResultAggregator<A, T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            sources: Vec::new(),
            by_layer: BTreeMap::new(),
            transformed_data_map: DataMap::new(),
            requeue_terms_map: DataMap::new(),
        }
    }
}

impl<A, T: Clone> ResultAggregator<A, T> {
    /// Record a value produced at `layer`
    pub fn record(&mut self, layer: usize, value: T, source_args: A) {
        self.by_layer.entry(layer).or_default().push(value.clone());
        self.all.push(value);
        self.sources.push(source_args);
    }
}

impl<A, T> ResultAggregator<A, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Merge entries collected from a produced value. Later keys overwrite
    /// earlier ones.
    pub fn merge_transformed_data(&mut self, data: DataMap) {
        self.transformed_data_map.extend(data);
    }

    /// Merge entries collected from requeue terms. Later keys overwrite
    /// earlier ones.
    pub fn merge_requeue_data(&mut self, data: DataMap) {
        self.requeue_terms_map.extend(data);
    }

    /// Build the final result, leaving out maps that were never populated.
    pub fn into_result(self) -> ExpansionResult<A, T> {
        let non_empty = |map: DataMap| (!map.is_empty()).then_some(map);
        ExpansionResult {
            all: self.all,
            by_layer: self.by_layer,
            transformed_data_map: non_empty(self.transformed_data_map),
            requeue_terms_map: non_empty(self.requeue_terms_map),
            sources: self.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_layers_sum_to_all() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record(0, 10, "a");
        aggregator.record(1, 11, "b");
        aggregator.record(0, 20, "c");

        let result = aggregator.into_result();
        assert_eq!(result.all, vec![10, 11, 20]);
        assert_eq!(result.layer(0), &[10, 20]);
        assert_eq!(result.layer(1), &[11]);
        assert!(result.layer(7).is_empty());
        assert_eq!(
            result.by_layer.values().map(Vec::len).sum::<usize>(),
            result.len()
        );
        assert_eq!(
            result.iter_with_sources().collect::<Vec<_>>(),
            vec![(&10, &"a"), (&11, &"b"), (&20, &"c")]
        );
    }

    #[test]
    fn test_unpopulated_maps_are_omitted() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record(0, 1, ());
        aggregator.merge_transformed_data(DataMap::new());

        let value = serde_json::to_value(aggregator.into_result()).unwrap();
        assert_eq!(value, json!({ "all": [1], "byLayer": { "0": [1] } }));
    }

    #[test]
    fn test_populated_maps_are_merged() {
        let mut aggregator: ResultAggregator<(), i32> = ResultAggregator::new();
        let first = json!({ "1": 0, "2": 1 });
        let second = json!({ "2": 5 });
        aggregator.merge_requeue_data(first.as_object().cloned().unwrap());
        aggregator.merge_requeue_data(second.as_object().cloned().unwrap());

        let result = aggregator.into_result();
        assert!(result.transformed_data_map.is_none());
        assert_eq!(
            serde_json::Value::Object(result.requeue_terms_map.unwrap()),
            json!({ "1": 0, "2": 5 })
        );
    }

    #[test]
    fn test_empty_result_shape() {
        let value = serde_json::to_value(ExpansionResult::<(), i32>::empty()).unwrap();
        assert_eq!(value, json!({ "all": [], "byLayer": {} }));
    }
}
