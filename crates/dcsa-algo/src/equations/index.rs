use super::equation::EquationId;
use super::variable::Variable;
use std::collections::HashMap;

/// Immutable row/column numbering produced by
/// [`EquationSystem::reindex`](super::EquationSystem::reindex).
///
/// Rows are variables, columns are active equations, both in creation order.
/// A snapshot never changes once built; structural edits require a new one.
#[derive(Debug, Clone)]
pub struct EquationIndex {
    variable_rows: HashMap<Variable, usize>,
    row_variables: Vec<Variable>,
    /// Column by equation id; `None` for inactive equations
    equation_columns: Vec<Option<usize>>,
    column_equations: Vec<EquationId>,
}

impl EquationIndex {
    pub(crate) fn new(row_variables: Vec<Variable>, equation_columns: Vec<Option<usize>>) -> Self {
        let variable_rows = row_variables
            .iter()
            .enumerate()
            .map(|(row, v)| (*v, row))
            .collect();
        let mut column_equations = vec![EquationId(0); row_variables.len()];
        for (id, column) in equation_columns.iter().enumerate() {
            if let Some(column) = column {
                column_equations[*column] = EquationId(id);
            }
        }
        Self {
            variable_rows,
            row_variables,
            equation_columns,
            column_equations,
        }
    }

    /// Size of the square system.
    pub fn dimension(&self) -> usize {
        self.row_variables.len()
    }

    pub fn row(&self, variable: &Variable) -> Option<usize> {
        self.variable_rows.get(variable).copied()
    }

    pub fn column(&self, equation: EquationId) -> Option<usize> {
        self.equation_columns.get(equation.0).copied().flatten()
    }

    pub fn variable_at(&self, row: usize) -> Variable {
        self.row_variables[row]
    }

    pub fn equation_at(&self, column: usize) -> EquationId {
        self.column_equations[column]
    }

    pub fn column_equations(&self) -> &[EquationId] {
        &self.column_equations
    }
}
