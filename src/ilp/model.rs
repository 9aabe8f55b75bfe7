//! Named-column MIP model. The builder fills columns, rows and a sparse
//! triple buffer; backends bulk-load it. Keeping the model in crate-owned
//! form makes the MPS bytes and all dumps reproducible for identical input.

use ahash::AHashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    /// `= rhs`
    Eq,
    /// `<= rhs`
    Le,
    /// `>= rhs`
    Ge,
}

/// Growable `(row, col, value)` triple store, uploaded once into the solver.
#[derive(Debug, Default, Clone)]
pub struct VariableMatrix {
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
}

impl VariableMatrix {
    pub fn add(&mut self, row: usize, col: usize, val: f64) {
        self.rows.push(row);
        self.cols.push(col);
        self.vals.push(val);
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.vals.iter())
            .map(|((&r, &c), &v)| (r, c, v))
    }
}

#[derive(Debug, Clone)]
struct ColDef {
    name: String,
    kind: ColKind,
    obj: f64,
    /// Both bounds pinned to this value (external pre-solve).
    fixed: Option<i64>,
}

#[derive(Debug, Clone)]
struct RowDef {
    name: String,
    sense: RowSense,
    rhs: f64,
}

/// A minimization MIP over named binary/integer columns.
#[derive(Debug, Default)]
pub struct MipModel {
    pub name: String,
    cols: Vec<ColDef>,
    rows: Vec<RowDef>,
    pub matrix: VariableMatrix,
    col_by_name: AHashMap<String, usize>,
}

impl MipModel {
    pub fn new(name: impl Into<String>) -> Self {
        MipModel {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_col(&mut self, name: String, kind: ColKind) -> usize {
        debug_assert!(
            !self.col_by_name.contains_key(&name),
            "duplicate column {name}"
        );
        let idx = self.cols.len();
        self.col_by_name.insert(name.clone(), idx);
        self.cols.push(ColDef {
            name,
            kind,
            obj: 0.0,
            fixed: None,
        });
        idx
    }

    pub fn set_obj_coef(&mut self, col: usize, v: f64) {
        self.cols[col].obj = v;
    }

    pub fn add_row(&mut self, name: String, sense: RowSense, rhs: f64) -> usize {
        let idx = self.rows.len();
        self.rows.push(RowDef { name, sense, rhs });
        idx
    }

    pub fn set_coef(&mut self, row: usize, col: usize, v: f64) {
        self.matrix.add(row, col, v);
    }

    pub fn num_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.col_by_name.get(name).copied()
    }

    pub fn row_name(&self, row: usize) -> &str {
        &self.rows[row].name
    }

    pub fn row_sense(&self, row: usize) -> RowSense {
        self.rows[row].sense
    }

    pub fn row_rhs(&self, row: usize) -> f64 {
        self.rows[row].rhs
    }

    pub fn col_name(&self, col: usize) -> &str {
        &self.cols[col].name
    }

    pub fn col_kind(&self, col: usize) -> ColKind {
        self.cols[col].kind
    }

    pub fn obj_coef(&self, col: usize) -> f64 {
        self.cols[col].obj
    }

    pub fn col_names(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(|c| c.name.as_str())
    }

    /// Pin both bounds of `name` to `val`. Returns false when the column is
    /// unknown (tolerated: external solution files may carry extra rows).
    pub fn fix_col(&mut self, name: &str, val: i64) -> bool {
        match self.col_by_name.get(name) {
            Some(&idx) => {
                self.cols[idx].fixed = Some(val);
                true
            }
            None => false,
        }
    }

    pub fn fixed(&self, col: usize) -> Option<i64> {
        self.cols[col].fixed
    }

    pub fn num_fixed(&self) -> usize {
        self.cols.iter().filter(|c| c.fixed.is_some()).count()
    }

    /// Per-column matrix entries in insertion order, for writers that need
    /// column-major output.
    fn entries_by_col(&self) -> Vec<Vec<(usize, f64)>> {
        let mut per_col = vec![Vec::new(); self.cols.len()];
        for (r, c, v) in self.matrix.iter() {
            per_col[c].push((r, v));
        }
        per_col
    }

    /// Per-row matrix entries in insertion order.
    fn entries_by_row(&self) -> Vec<Vec<(usize, f64)>> {
        let mut per_row = vec![Vec::new(); self.rows.len()];
        for (r, c, v) in self.matrix.iter() {
            per_row[r].push((c, v));
        }
        per_row
    }

    /// Free-format MPS. Byte-reproducible for identical models.
    pub fn write_mps<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "NAME {}", self.name)?;
        writeln!(w, "ROWS")?;
        writeln!(w, " N obj")?;
        for row in &self.rows {
            let t = match row.sense {
                RowSense::Eq => 'E',
                RowSense::Le => 'L',
                RowSense::Ge => 'G',
            };
            writeln!(w, " {} {}", t, row.name)?;
        }

        writeln!(w, "COLUMNS")?;
        writeln!(w, " MARKER 'MARKER' 'INTORG'")?;
        let per_col = self.entries_by_col();
        for (ci, col) in self.cols.iter().enumerate() {
            if col.obj != 0.0 {
                writeln!(w, " {} obj {}", col.name, col.obj)?;
            }
            for &(ri, v) in &per_col[ci] {
                writeln!(w, " {} {} {}", col.name, self.rows[ri].name, v)?;
            }
        }
        writeln!(w, " MARKER 'MARKER' 'INTEND'")?;

        writeln!(w, "RHS")?;
        for row in &self.rows {
            writeln!(w, " rhs {} {}", row.name, row.rhs)?;
        }

        writeln!(w, "BOUNDS")?;
        for col in &self.cols {
            match (col.fixed, col.kind) {
                (Some(v), _) => writeln!(w, " FX bnd {} {}", col.name, v)?,
                (None, ColKind::Binary) => writeln!(w, " BV bnd {}", col.name)?,
                (None, ColKind::Integer) => writeln!(w, " MI bnd {}", col.name)?,
                (None, ColKind::Continuous) => writeln!(w, " MI bnd {}", col.name)?,
            }
        }
        writeln!(w, "ENDATA")?;
        Ok(())
    }

    pub fn write_mps_to_path(&self, path: &Path) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_mps(&mut w)?;
        w.flush()
    }

    /// Textual rendering of the objective and every constraint. Zero
    /// coefficients are omitted, unit coefficients are implicit.
    pub fn write_human_readable<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut obj = String::new();
        for col in &self.cols {
            append_term(&mut obj, col.obj, &col.name);
        }
        writeln!(w, "min {}", obj)?;

        let per_row = self.entries_by_row();
        for (ri, row) in self.rows.iter().enumerate() {
            let mut line = String::new();
            for &(ci, v) in &per_row[ri] {
                append_term(&mut line, v, &self.cols[ci].name);
            }
            let op = match row.sense {
                RowSense::Eq => "=",
                RowSense::Le => "<=",
                RowSense::Ge => ">=",
            };
            writeln!(w, "{} {} {}", line, op, row.rhs)?;
        }
        Ok(())
    }

    pub fn write_human_readable_to_path(&self, path: &Path) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_human_readable(&mut w)?;
        w.flush()
    }

    /// Full solution listing, `index name value` per column, preceded by an
    /// objective header. The format round-trips through the external
    /// solution parser.
    pub fn write_solution<W: Write>(
        &self,
        w: &mut W,
        objective: f64,
        value: impl Fn(&str) -> Option<f64>,
    ) -> io::Result<()> {
        writeln!(w, "objective {}", objective)?;
        for (i, col) in self.cols.iter().enumerate() {
            writeln!(w, "{} {} {}", i, col.name, value(&col.name).unwrap_or(0.0))?;
        }
        Ok(())
    }
}

const COEF_EPS: f64 = 1e-6;

fn append_term(buf: &mut String, coef: f64, name: &str) {
    if coef.abs() < COEF_EPS {
        return;
    }
    if buf.is_empty() {
        if coef < 0.0 {
            buf.push_str("- ");
        }
    } else if coef > 0.0 {
        buf.push_str(" + ");
    } else {
        buf.push_str(" - ");
    }
    if (coef.abs() - 1.0).abs() > COEF_EPS {
        buf.push_str(&format!("{} ", coef.abs()));
    }
    buf.push_str(name);
}
