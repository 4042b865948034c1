use ndarray::{arr0, Array1, ArrayD};
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigurationError, PreprocessingError};

#[derive(Debug, Clone, PartialEq)]
pub enum ObservationComponent {
    Continuous(ArrayD<f64>),
    Categorical(ArrayD<i64>),
}

impl ObservationComponent {
    pub fn vector(values: Vec<f64>) -> Self {
        ObservationComponent::Continuous(Array1::from(values).into_dyn())
    }

    pub fn category(value: i64) -> Self {
        ObservationComponent::Categorical(arr0(value).into_dyn())
    }

    fn shape(&self) -> &[usize] {
        match self {
            ObservationComponent::Continuous(arr) => arr.shape(),
            ObservationComponent::Categorical(arr) => arr.shape(),
        }
    }
}

/// An observation as the environment emits it, before preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub components: Vec<ObservationComponent>,
}

impl RawObservation {
    pub fn new(components: Vec<ObservationComponent>) -> Self {
        Self { components }
    }

    pub fn single(component: ObservationComponent) -> Self {
        Self {
            components: vec![component],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentSpace {
    Continuous {
        shape: Vec<usize>,
    },
    Categorical {
        shape: Vec<usize>,
        num_categories: usize,
    },
}

impl ComponentSpace {
    fn shape(&self) -> &[usize] {
        match self {
            ComponentSpace::Continuous { shape } => shape,
            ComponentSpace::Categorical { shape, .. } => shape,
        }
    }

    fn num_elements(&self) -> usize {
        self.shape().iter().product()
    }
}

/// Declared layout of every observation an environment can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationSpace {
    pub components: Vec<ComponentSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlattenCategories {
    Disabled,
    /// One-hot with each component's own cardinality.
    Inferred,
    /// One-hot; every categorical component must have exactly this cardinality.
    Exactly(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreprocessorDescriptor {
    Reshape {
        flatten: bool,
        flatten_categories: FlattenCategories,
    },
    Divide {
        divisor: f64,
    },
    Clip {
        min: f64,
        max: f64,
    },
}

impl PreprocessorDescriptor {
    fn expands_categories(&self) -> bool {
        match self {
            PreprocessorDescriptor::Reshape {
                flatten,
                flatten_categories,
            } => *flatten && *flatten_categories != FlattenCategories::Disabled,
            _ => false,
        }
    }
}

enum Stage {
    Numeric(Vec<f64>),
    Categorical {
        values: Vec<i64>,
        num_categories: usize,
    },
}

/// Turns raw observations into flat feature vectors of a fixed length.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    space: ObservationSpace,
    descriptors: Vec<PreprocessorDescriptor>,
    output_dim: usize,
}

impl Preprocessor {
    pub fn new(
        space: ObservationSpace,
        descriptors: Vec<PreprocessorDescriptor>,
    ) -> Result<Self, ConfigurationError> {
        if space.components.is_empty() {
            return Err(ConfigurationError::ObservationSpace(
                "observation space has no components".to_string(),
            ));
        }
        for descriptor in &descriptors {
            match descriptor {
                PreprocessorDescriptor::Reshape {
                    flatten_categories: FlattenCategories::Exactly(n),
                    ..
                } => {
                    for component in &space.components {
                        if let ComponentSpace::Categorical { num_categories, .. } = component {
                            if num_categories != n {
                                return Err(ConfigurationError::ObservationSpace(format!(
                                    "flatten_categories is {} but a categorical component has {} categories",
                                    n, num_categories
                                )));
                            }
                        }
                    }
                }
                PreprocessorDescriptor::Divide { divisor } => {
                    if *divisor == 0.0 || !divisor.is_finite() {
                        return Err(ConfigurationError::OutOfRange {
                            field: "preprocessing_spec.divisor",
                            range: "finite, non-zero",
                            value: *divisor,
                        });
                    }
                }
                PreprocessorDescriptor::Clip { min, max } => {
                    if min > max {
                        return Err(ConfigurationError::OutOfRange {
                            field: "preprocessing_spec.min",
                            range: "(-inf, max]",
                            value: *min,
                        });
                    }
                }
                _ => {}
            }
        }
        for component in &space.components {
            if let ComponentSpace::Categorical { num_categories, .. } = component {
                if *num_categories == 0 {
                    return Err(ConfigurationError::ObservationSpace(
                        "categorical component with zero categories".to_string(),
                    ));
                }
            }
        }

        let expands = descriptors.iter().any(|d| d.expands_categories());
        let output_dim = space
            .components
            .iter()
            .map(|component| match component {
                ComponentSpace::Categorical { num_categories, .. } if expands => {
                    component.num_elements() * num_categories
                }
                _ => component.num_elements(),
            })
            .sum();

        Ok(Self {
            space,
            descriptors,
            output_dim,
        })
    }

    /// Length of every vector `process` returns.
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn process(&self, raw: &RawObservation) -> Result<Vec<f64>, PreprocessingError> {
        self.check(raw)?;
        let mut stages: Vec<Stage> = raw
            .components
            .iter()
            .zip(&self.space.components)
            .map(|(component, space)| match (component, space) {
                (ObservationComponent::Continuous(arr), _) => {
                    Stage::Numeric(arr.iter().copied().collect())
                }
                (
                    ObservationComponent::Categorical(arr),
                    ComponentSpace::Categorical { num_categories, .. },
                ) => Stage::Categorical {
                    values: arr.iter().copied().collect(),
                    num_categories: *num_categories,
                },
                // kinds were matched in `check`
                (ObservationComponent::Categorical(arr), _) => {
                    Stage::Numeric(arr.iter().map(|v| *v as f64).collect())
                }
            })
            .collect();

        for descriptor in &self.descriptors {
            stages = stages
                .into_iter()
                .map(|stage| apply(descriptor, stage))
                .collect();
        }

        let mut out = Vec::with_capacity(self.output_dim);
        for stage in stages {
            match stage {
                Stage::Numeric(values) => out.extend(values),
                Stage::Categorical { values, .. } => out.extend(values.iter().map(|v| *v as f64)),
            }
        }
        Ok(out)
    }

    fn check(&self, raw: &RawObservation) -> Result<(), PreprocessingError> {
        if raw.components.len() != self.space.components.len() {
            return Err(PreprocessingError::ComponentCount {
                expected: self.space.components.len(),
                got: raw.components.len(),
            });
        }
        for (index, (component, space)) in raw
            .components
            .iter()
            .zip(&self.space.components)
            .enumerate()
        {
            if component.shape() != space.shape() {
                return Err(PreprocessingError::ShapeMismatch {
                    index,
                    expected: space.shape().to_vec(),
                    got: component.shape().to_vec(),
                });
            }
            match (component, space) {
                (ObservationComponent::Continuous(arr), ComponentSpace::Continuous { .. }) => {
                    if arr.iter().any(|v| !v.is_finite()) {
                        return Err(PreprocessingError::NonFinite { index });
                    }
                }
                (
                    ObservationComponent::Categorical(arr),
                    ComponentSpace::Categorical { num_categories, .. },
                ) => {
                    if let Some(value) = arr
                        .iter()
                        .find(|v| **v < 0 || **v as usize >= *num_categories)
                    {
                        return Err(PreprocessingError::CategoryOutOfRange {
                            index,
                            value: *value,
                            num_categories: *num_categories,
                        });
                    }
                }
                (_, ComponentSpace::Continuous { .. }) => {
                    return Err(PreprocessingError::KindMismatch {
                        index,
                        expected: "continuous",
                    })
                }
                (_, ComponentSpace::Categorical { .. }) => {
                    return Err(PreprocessingError::KindMismatch {
                        index,
                        expected: "categorical",
                    })
                }
            }
        }
        Ok(())
    }
}

fn apply(descriptor: &PreprocessorDescriptor, stage: Stage) -> Stage {
    match (descriptor, stage) {
        (
            PreprocessorDescriptor::Reshape { .. },
            Stage::Categorical {
                values,
                num_categories,
            },
        ) if descriptor.expands_categories() => {
            let mut one_hot = vec![0.0; values.len() * num_categories];
            for (i, v) in values.iter().enumerate() {
                one_hot[i * num_categories + *v as usize] = 1.0;
            }
            Stage::Numeric(one_hot)
        }
        (PreprocessorDescriptor::Divide { divisor }, Stage::Numeric(values)) => {
            Stage::Numeric(values.into_iter().map(|v| v / divisor).collect())
        }
        (PreprocessorDescriptor::Clip { min, max }, Stage::Numeric(values)) => {
            Stage::Numeric(values.into_iter().map(|v| v.clamp(*min, *max)).collect())
        }
        (_, stage) => stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn reshape(flatten_categories: FlattenCategories) -> PreprocessorDescriptor {
        PreprocessorDescriptor::Reshape {
            flatten: true,
            flatten_categories,
        }
    }

    fn grid_space() -> ObservationSpace {
        ObservationSpace {
            components: vec![ComponentSpace::Categorical {
                shape: vec![],
                num_categories: 121,
            }],
        }
    }

    #[test]
    fn test_one_hot_expansion() {
        let pre =
            Preprocessor::new(grid_space(), vec![reshape(FlattenCategories::Exactly(121))]).unwrap();
        assert_eq!(pre.output_dim(), 121);
        let out = pre
            .process(&RawObservation::single(ObservationComponent::category(5)))
            .unwrap();
        assert_eq!(out.len(), 121);
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn test_mixed_components_flatten_in_order() {
        let space = ObservationSpace {
            components: vec![
                ComponentSpace::Continuous { shape: vec![2, 2] },
                ComponentSpace::Categorical {
                    shape: vec![2],
                    num_categories: 3,
                },
            ],
        };
        let pre = Preprocessor::new(
            space,
            vec![
                reshape(FlattenCategories::Inferred),
                PreprocessorDescriptor::Divide { divisor: 2.0 },
            ],
        )
        .unwrap();
        assert_eq!(pre.output_dim(), 4 + 2 * 3);
        let raw = RawObservation::new(vec![
            ObservationComponent::Continuous(
                Array2::from_shape_vec((2, 2), vec![2.0, 4.0, 6.0, 8.0])
                    .unwrap()
                    .into_dyn(),
            ),
            ObservationComponent::Categorical(ndarray::arr1(&[2, 0]).into_dyn()),
        ]);
        let out = pre.process(&raw).unwrap();
        assert_eq!(
            out,
            vec![1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0]
        );
    }

    #[test]
    fn test_without_flatten_categories_pass_through() {
        let pre = Preprocessor::new(grid_space(), vec![reshape(FlattenCategories::Disabled)])
            .unwrap();
        assert_eq!(pre.output_dim(), 1);
        let out = pre
            .process(&RawObservation::single(ObservationComponent::category(7)))
            .unwrap();
        assert_eq!(out, vec![7.0]);
    }

    #[test]
    fn test_clip() {
        let space = ObservationSpace {
            components: vec![ComponentSpace::Continuous { shape: vec![3] }],
        };
        let pre =
            Preprocessor::new(space, vec![PreprocessorDescriptor::Clip { min: -1.0, max: 1.0 }])
                .unwrap();
        let out = pre
            .process(&RawObservation::single(ObservationComponent::vector(vec![
                -3.0, 0.5, 9.0,
            ])))
            .unwrap();
        assert_eq!(out, vec![-1.0, 0.5, 1.0]);
    }

    #[test]
    fn test_malformed_observations() {
        let pre =
            Preprocessor::new(grid_space(), vec![reshape(FlattenCategories::Exactly(121))]).unwrap();
        let out_of_range = pre.process(&RawObservation::single(ObservationComponent::category(121)));
        assert!(matches!(
            out_of_range,
            Err(PreprocessingError::CategoryOutOfRange { value: 121, .. })
        ));
        let wrong_kind = pre.process(&RawObservation::single(ObservationComponent::vector(vec![])));
        assert!(matches!(
            wrong_kind,
            Err(PreprocessingError::ShapeMismatch { .. }) | Err(PreprocessingError::KindMismatch { .. })
        ));
        let wrong_count = pre.process(&RawObservation::new(vec![]));
        assert_eq!(
            wrong_count,
            Err(PreprocessingError::ComponentCount {
                expected: 1,
                got: 0
            })
        );
        // still usable after a failure
        assert!(pre
            .process(&RawObservation::single(ObservationComponent::category(0)))
            .is_ok());
    }

    #[test]
    fn test_category_count_must_match() {
        let res = Preprocessor::new(grid_space(), vec![reshape(FlattenCategories::Exactly(16))]);
        assert!(matches!(res, Err(ConfigurationError::ObservationSpace(_))));
    }
}
