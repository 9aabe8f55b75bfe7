//! In-process CBC backend. Columns, rows and the triple buffer of the
//! [`MipModel`] are bulk-loaded into a fresh CBC model per solve; the model
//! is dropped on every exit path.

use super::{MipBackend, MipSolution, SolveParams, SolveStatus};
use crate::error::OptimError;
use crate::ilp::model::{ColKind, MipModel, RowSense};
use ahash::AHashMap;
use coin_cbc::{Col, Model, Sense};
use log::debug;

#[derive(Debug, Default)]
pub struct CbcBackend;

impl CbcBackend {
    pub fn new() -> Self {
        CbcBackend
    }
}

impl MipBackend for CbcBackend {
    fn solve(&mut self, model: &MipModel, params: &SolveParams) -> Result<MipSolution, OptimError> {
        let mut m = Model::default();
        m.set_obj_sense(Sense::Minimize);

        let mut cols: Vec<Col> = Vec::with_capacity(model.num_cols());
        for ci in 0..model.num_cols() {
            let col = match model.col_kind(ci) {
                ColKind::Binary => m.add_binary(),
                ColKind::Integer => m.add_integer(),
                ColKind::Continuous => m.add_col(),
            };
            m.set_obj_coeff(col, model.obj_coef(ci));
            if let Some(v) = model.fixed(ci) {
                m.set_col_lower(col, v as f64);
                m.set_col_upper(col, v as f64);
            }
            cols.push(col);
        }

        let mut rows = Vec::with_capacity(model.num_rows());
        for _ in 0..model.num_rows() {
            rows.push(m.add_row());
        }
        for (ri, row) in rows.iter().enumerate() {
            match model.row_sense(ri) {
                RowSense::Eq => m.set_row_equal(*row, model.row_rhs(ri)),
                RowSense::Le => m.set_row_upper(*row, model.row_rhs(ri)),
                RowSense::Ge => m.set_row_lower(*row, model.row_rhs(ri)),
            }
        }

        for (r, c, v) in model.matrix.iter() {
            m.set_weight(rows[r], cols[c], v);
        }

        m.set_parameter("logLevel", "0");
        m.set_parameter("presolve", "on");
        m.set_parameter("preprocess", "on");
        let secs = (params.time_limit.as_millis() as f64 / 1000.0).ceil().max(1.0);
        m.set_parameter("seconds", &format!("{}", secs as u64));
        m.set_parameter("threads", &params.threads.to_string());
        m.set_parameter(
            "feaspump",
            if params.use_feasibility_pump { "on" } else { "off" },
        );
        m.set_parameter(
            "proximitySearch",
            if params.use_proximity_search { "on" } else { "off" },
        );

        debug!(
            "cbc solve: {} cols, {} rows, limit {}s",
            model.num_cols(),
            model.num_rows(),
            secs
        );

        let sol = m.solve();
        let raw = sol.raw();

        let status = if raw.is_proven_optimal() {
            SolveStatus::Optimal
        } else if raw.is_proven_infeasible() {
            SolveStatus::Infeasible
        } else {
            SolveStatus::NonOptimal
        };

        let mut values: AHashMap<String, f64> =
            AHashMap::with_capacity(model.num_cols());
        if status == SolveStatus::Optimal {
            for (ci, col) in cols.iter().enumerate() {
                values.insert(model.col_name(ci).to_string(), sol.col(*col));
            }
        }

        Ok(MipSolution::new(values, raw.obj_value(), status))
    }
}
