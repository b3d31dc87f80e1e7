//! Augmented matrix with elementary row operations and Gauss-Jordan reduction
//!
//! The last column of an [`AugmentedMatrix`] holds the right-hand-side
//! constants of the equations, so `rows x (vars + 1)` entries describe a
//! linear system `A·x = b`. Row operations snap entries whose magnitude falls
//! under the matrix's snapping threshold to exactly zero; the reduction treats
//! an entry as zero when its stored value is `0.0`. Subnormal entries are never
//! chosen as pivots, since their reciprocal overflows.

use std::fmt;

use tracing::trace;

use crate::core::DEFAULT_SNAP_EPSILON;
use crate::validation::error::{Result, SolverError};

/// Outcome of [`AugmentedMatrix::row_reduce`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowReduction {
    /// The matrix is in reduced row-echelon form and the system has solutions
    Solved,
    /// A row reduced to `[0 ... 0 | c]` with `c != 0`
    Inconsistent,
}

/// Result of scanning for the next pivot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PivotSearch {
    Found { row: usize, col: usize },
    Exhausted,
}

/// Dense, row-major augmented matrix
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
    snap_epsilon: f64,
}

impl AugmentedMatrix {
    /// Zero-filled `rows x cols` matrix with the default snapping threshold
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_snap_epsilon(rows, cols, DEFAULT_SNAP_EPSILON)
    }

    /// Zero-filled matrix snapping entries below `snap_epsilon` to zero.
    /// Negative or NaN thresholds disable snapping.
    pub fn with_snap_epsilon(rows: usize, cols: usize, snap_epsilon: f64) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
            snap_epsilon: sanitize_snap_epsilon(snap_epsilon),
        }
    }

    /// Build from explicit rows; every row must have the same length and
    /// every entry must be finite
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(SolverError::invalid_input(format!(
                "row {} has {} entries, expected {}",
                index,
                row.len(),
                cols
            )));
        }
        for (row, values) in rows.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                check_finite(row, col, *value)?;
            }
        }
        let mut matrix = Self::new(rows.len(), cols);
        matrix.data = rows.iter().flatten().copied().collect();
        Ok(matrix)
    }

    /// Same as [`from_rows`](Self::from_rows) with a custom snapping threshold
    pub fn from_rows_with_snap_epsilon(rows: &[Vec<f64>], snap_epsilon: f64) -> Result<Self> {
        let mut matrix = Self::from_rows(rows)?;
        matrix.snap_epsilon = sanitize_snap_epsilon(snap_epsilon);
        Ok(matrix)
    }

    /// Number of equations
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns including the constants column
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of unknowns (all columns but the constants column)
    pub fn num_variables(&self) -> usize {
        self.cols.saturating_sub(1)
    }

    pub fn snap_epsilon(&self) -> f64 {
        self.snap_epsilon
    }

    /// Store a finite `value`; NaN and infinities are rejected
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let index = self.index(row, col)?;
        check_finite(row, col, value)?;
        self.data[index] = value;
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        Ok(self.data[self.index(row, col)?])
    }

    /// Borrow one equation, constants included
    pub fn row(&self, row: usize) -> Result<&[f64]> {
        self.check_row(row)?;
        Ok(&self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Copy of the matrix as nested rows
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.data.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    /// Reset every entry to zero
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Multiply every entry of `row` by a non-zero `scalar`
    pub fn scale(&mut self, row: usize, scalar: f64) -> Result<()> {
        self.check_row(row)?;
        if scalar == 0.0 || !scalar.is_finite() {
            return Err(SolverError::invalid_input(format!(
                "cannot scale row {} by {}",
                row, scalar
            )));
        }
        self.scale_row(row, scalar);
        Ok(())
    }

    /// Swap two equations
    pub fn interchange(&mut self, row1: usize, row2: usize) -> Result<()> {
        self.check_row(row1)?;
        self.check_row(row2)?;
        self.swap_rows(row1, row2);
        Ok(())
    }

    /// `row1 <- row1 + scalar * row2`
    pub fn replace(&mut self, row1: usize, scalar: f64, row2: usize) -> Result<()> {
        self.check_row(row1)?;
        self.check_row(row2)?;
        if !scalar.is_finite() {
            return Err(SolverError::invalid_input(format!(
                "cannot replace row {} with non-finite multiple {} of row {}",
                row1, scalar, row2
            )));
        }
        self.add_multiple(row1, scalar, row2);
        Ok(())
    }

    /// Reduce the matrix in place to reduced row-echelon form.
    ///
    /// The forward phase walks the columns left to right, moving a non-zero
    /// entry into each pivot row, scaling it to one and clearing the entries
    /// below it. The backward phase walks the pivot rows bottom-up, clearing
    /// the entries above each pivot. A leading entry in the constants column
    /// stops the reduction and reports [`RowReduction::Inconsistent`].
    pub fn row_reduce(&mut self) -> RowReduction {
        let mut pivot_col = 0;
        for pivot_row in 0..self.rows {
            let (row, col) = match self.find_pivot(pivot_row, pivot_col) {
                PivotSearch::Found { row, col } => (row, col),
                PivotSearch::Exhausted => break,
            };

            self.swap_rows(pivot_row, row);
            let pivot = self.at(pivot_row, col);
            self.scale_row(pivot_row, 1.0 / pivot);
            // pivots are exactly one so the eliminations below cancel exactly
            let index = pivot_row * self.cols + col;
            self.data[index] = 1.0;

            for below in pivot_row + 1..self.rows {
                let factor = self.at(below, col);
                if factor != 0.0 {
                    self.add_multiple(below, -factor, pivot_row);
                }
            }
            pivot_col = col + 1;
        }

        let constants = self.cols.saturating_sub(1);
        for pivot_row in (0..self.rows).rev() {
            let Some(lead) = self.leading_column(pivot_row) else {
                continue;
            };
            if lead == constants {
                trace!(row = pivot_row, "pivot in constants column");
                return RowReduction::Inconsistent;
            }
            for above in (0..pivot_row).rev() {
                let factor = self.at(above, lead);
                if factor != 0.0 {
                    self.add_multiple(above, -factor, pivot_row);
                }
            }
        }

        trace!(rows = self.rows, cols = self.cols, "matrix reduced");
        RowReduction::Solved
    }

    /// Read the solution out of a reduced matrix
    pub fn solution(&self) -> SolutionSet {
        let variables = self.num_variables();
        let mut pivots = Vec::new();
        let mut consistent = true;

        for row in 0..self.rows {
            let Some(lead) = self.leading_column(row) else {
                continue;
            };
            if lead >= variables {
                consistent = false;
                continue;
            }
            pivots.push(PivotVariable {
                variable: lead,
                constant: self.at(row, variables),
                coefficients: (lead + 1..variables)
                    .map(|col| (col, self.at(row, col)))
                    .filter(|(_, value)| *value != 0.0)
                    .collect(),
            });
        }

        let free_variables = (0..variables)
            .filter(|var| !pivots.iter().any(|p| p.variable == *var))
            .collect();

        SolutionSet {
            variables,
            pivots,
            free_variables,
            consistent,
        }
    }

    fn index(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(SolverError::IndexOutOfRange {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows {
            return Err(SolverError::IndexOutOfRange {
                row,
                col: 0,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    fn snap(&self, value: f64) -> f64 {
        if value.abs() < self.snap_epsilon {
            0.0
        } else {
            value
        }
    }

    fn scale_row(&mut self, row: usize, scalar: f64) {
        for col in 0..self.cols {
            let index = row * self.cols + col;
            self.data[index] = self.snap(self.data[index] * scalar);
        }
    }

    fn swap_rows(&mut self, row1: usize, row2: usize) {
        if row1 == row2 {
            return;
        }
        for col in 0..self.cols {
            self.data.swap(row1 * self.cols + col, row2 * self.cols + col);
        }
    }

    fn add_multiple(&mut self, target: usize, scalar: f64, source: usize) {
        for col in 0..self.cols {
            let value = self.at(target, col) + scalar * self.at(source, col);
            self.data[target * self.cols + col] = self.snap(value);
        }
    }

    /// Scan columns from `start_col`, rows from `start_row`, for a stored non-zero
    fn find_pivot(&self, start_row: usize, start_col: usize) -> PivotSearch {
        for col in start_col..self.cols {
            for row in start_row..self.rows {
                if is_pivot_candidate(self.at(row, col)) {
                    return PivotSearch::Found { row, col };
                }
            }
        }
        PivotSearch::Exhausted
    }

    fn leading_column(&self, row: usize) -> Option<usize> {
        (0..self.cols).find(|&col| is_pivot_candidate(self.at(row, col)))
    }
}

/// Non-zero with a finite reciprocal
fn is_pivot_candidate(value: f64) -> bool {
    value.abs() >= f64::MIN_POSITIVE
}

fn check_finite(row: usize, col: usize, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(SolverError::invalid_input(format!(
            "entry ({}, {}) is {}, expected a finite value",
            row, col, value
        )));
    }
    Ok(())
}

fn sanitize_snap_epsilon(snap_epsilon: f64) -> f64 {
    if snap_epsilon.is_nan() {
        0.0
    } else {
        snap_epsilon.max(0.0)
    }
}

impl fmt::Display for AugmentedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variables = self.num_variables();
        for row in 0..self.rows {
            write!(f, "[")?;
            for col in 0..self.cols {
                if col == variables && self.cols > 0 {
                    write!(f, " |")?;
                }
                write!(f, " {:>10.4}", self.at(row, col))?;
            }
            writeln!(f, " ]")?;
        }
        Ok(())
    }
}

/// A basic variable of a reduced system, `x[variable] + sum(c·x[free]) = constant`
#[derive(Debug, Clone, PartialEq)]
pub struct PivotVariable {
    pub variable: usize,
    pub constant: f64,
    /// Non-zero coefficients on later (free) variables
    pub coefficients: Vec<(usize, f64)>,
}

/// Solutions of a matrix in reduced row-echelon form
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionSet {
    variables: usize,
    pivots: Vec<PivotVariable>,
    free_variables: Vec<usize>,
    consistent: bool,
}

impl SolutionSet {
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Exactly one solution exists
    pub fn is_unique(&self) -> bool {
        self.consistent && self.free_variables.is_empty()
    }

    pub fn pivots(&self) -> &[PivotVariable] {
        &self.pivots
    }

    pub fn free_variables(&self) -> &[usize] {
        &self.free_variables
    }

    /// Value of a basic variable; `None` for free variables
    pub fn value(&self, variable: usize) -> Option<f64> {
        self.pivots
            .iter()
            .find(|p| p.variable == variable)
            .map(|p| p.constant)
    }

    /// The solution obtained by setting every free variable to zero
    pub fn particular(&self) -> Vec<f64> {
        (0..self.variables)
            .map(|var| self.value(var).unwrap_or(0.0))
            .collect()
    }
}

impl fmt::Display for SolutionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.consistent {
            return write!(f, "inconsistent system, no solution");
        }
        for pivot in &self.pivots {
            write!(f, "x{} = {:.5}", pivot.variable + 1, pivot.constant)?;
            for (col, coefficient) in &pivot.coefficients {
                let sign = if *coefficient > 0.0 { '-' } else { '+' };
                write!(f, " {} {:.5} (x{})", sign, coefficient.abs(), col + 1)?;
            }
            writeln!(f)?;
        }
        for free in &self.free_variables {
            writeln!(f, "x{} is free", free + 1)?;
        }
        Ok(())
    }
}
