//! Built-in grid lists, indexed by `grid_index` in the run configuration.

use crate::ml::params::ParamValue;
use crate::pipeline::{NORMALIZATION_PARAM, SELECTION_PARAM};

use super::grid::GridEntry;

fn widths() -> Vec<ParamValue> {
    vec![
        ParamValue::Int(32),
        ParamValue::Int(64),
        ParamValue::Int(128),
        ParamValue::from("all"),
    ]
}

fn both_normalizations() -> [&'static str; 2] {
    ["standard", "minmax"]
}

/// Search-mode grids, one per estimator family.
pub fn search_grids() -> Vec<GridEntry> {
    vec![
        GridEntry::new()
            .axis("estimator", ["gradient_linear"])
            .axis("estimator__early_stopping", ["true"])
            .axis("estimator__max_iter", [5000i64])
            .axis(NORMALIZATION_PARAM, both_normalizations())
            .axis(SELECTION_PARAM, widths())
            .axis("estimator__penalty", ["l2", "elasticnet", "l1"])
            .axis("estimator__loss", ["hinge", "log"]),
        GridEntry::new()
            .axis("estimator", ["kernel_svm"])
            .axis(NORMALIZATION_PARAM, both_normalizations())
            .axis("estimator__C", [0.01, 0.1, 1.0, 10.0, 100.0])
            .axis("estimator__kernel", ["rbf"])
            .axis(SELECTION_PARAM, widths()),
        GridEntry::new()
            .axis("estimator", ["gradient_boosted_trees"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__n_estimators", [32i64, 128])
            .axis(
                "estimator__max_depth",
                [ParamValue::Int(32), ParamValue::Int(64), ParamValue::None],
            )
            .axis("estimator__learning_rate", [0.01, 0.1])
            .axis(SELECTION_PARAM, widths()),
        GridEntry::new()
            .axis("estimator", ["extra_trees"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__n_estimators", [32i64, 128])
            .axis(
                "estimator__max_depth",
                [ParamValue::Int(32), ParamValue::Int(64), ParamValue::None],
            )
            .axis(SELECTION_PARAM, widths()),
        GridEntry::new()
            .axis("estimator", ["multi_layer_perceptron"])
            .axis("estimator__early_stopping", ["true"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__batch_size", [32i64, 128, 512])
            .axis(
                "estimator__hidden_layer_sizes",
                [vec![256usize, 32], vec![64, 32]],
            )
            .axis("estimator__activation", ["relu"])
            .axis("estimator__alpha", [0.0001, 0.05])
            .axis("estimator__solver", ["adam"])
            .axis(SELECTION_PARAM, widths()),
    ]
}

/// Final-mode grids: one fixed configuration per family.
pub fn final_grids() -> Vec<GridEntry> {
    vec![
        GridEntry::new()
            .axis("estimator", ["gradient_linear"])
            .axis("estimator__early_stopping", ["true"])
            .axis("estimator__max_iter", [5000i64])
            .axis(NORMALIZATION_PARAM, ["minmax"])
            .axis(SELECTION_PARAM, ["all"])
            .axis("estimator__penalty", ["l1"])
            .axis("estimator__loss", ["log"]),
        GridEntry::new()
            .axis("estimator", ["kernel_svm"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__C", [1.0])
            .axis("estimator__kernel", ["rbf"])
            .axis("estimator__gamma", ["scale"])
            .axis(SELECTION_PARAM, ["all"]),
        GridEntry::new()
            .axis("estimator", ["extra_trees"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__n_estimators", [128i64])
            .axis("estimator__max_depth", [ParamValue::None])
            .axis(SELECTION_PARAM, ["all"]),
        GridEntry::new()
            .axis("estimator", ["gradient_boosted_trees"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__n_estimators", [128i64])
            .axis("estimator__max_depth", [6i64])
            .axis("estimator__learning_rate", [0.1])
            .axis(SELECTION_PARAM, ["all"]),
        GridEntry::new()
            .axis("estimator", ["multi_layer_perceptron"])
            .axis(NORMALIZATION_PARAM, ["standard"])
            .axis("estimator__batch_size", [128i64])
            .axis("estimator__hidden_layer_sizes", [vec![100usize]])
            .axis("estimator__activation", ["relu"])
            .axis("estimator__alpha", [0.0001])
            .axis("estimator__solver", ["adam"])
            .axis(SELECTION_PARAM, ["all"]),
    ]
}
