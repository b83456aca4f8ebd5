//! Open-table stack with the insertion cursor and pending row spans.

use crate::model::{
    Block, Paragraph, Table, TableCell, TableCellProperties, TableRow, TableWidth, VerticalMerge,
};

/// Largest `colspan` honoured, as in HTML.
pub const MAX_COL_SPAN: u32 = 1000;
/// Largest `rowspan` honoured, as in HTML.
pub const MAX_ROW_SPAN: u32 = 65534;

/// A cell spanning several rows, still owing placeholders below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    /// Row index and grid column of the spanning cell.
    pub origin: (i32, u32),
    pub remaining: u32,
    pub col_span: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TableState {
    pub table: Table,
    /// Current (row, column); the row is -1 until the first `<tr>`.
    pub row: i32,
    pub column: u32,
    pub row_spans: Vec<RowSpan>,
    pub captions: Vec<Paragraph>,
}

impl TableState {
    fn new(table: Table) -> Self {
        Self {
            table,
            row: -1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct TableContext {
    stack: Vec<TableState>,
}

impl TableContext {
    pub fn new_context(&mut self, table: Table) {
        self.stack.push(TableState::new(table));
    }

    /// Pops the innermost table and finalizes its grid.
    pub fn close_context(&mut self) -> Option<TableState> {
        let mut state = self.stack.pop()?;
        finalize(&mut state.table);
        Some(state)
    }

    pub fn has_context(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current(&self) -> Option<&TableState> {
        self.stack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut TableState> {
        self.stack.last_mut()
    }

    pub fn current_table(&mut self) -> Option<&mut Table> {
        self.stack.last_mut().map(|s| &mut s.table)
    }

    pub fn cursor(&self) -> Option<(i32, u32)> {
        self.current().map(|s| (s.row, s.column))
    }

    pub fn pending_spans(&self) -> &[RowSpan] {
        self.current().map_or(&[], |s| s.row_spans.as_slice())
    }

    pub fn begin_row(&mut self, height: Option<u32>) {
        if let Some(state) = self.current_mut() {
            state.row += 1;
            state.column = 0;
            state.table.rows.push(TableRow {
                height,
                cells: Vec::new(),
            });
        }
    }

    /// Adds a cell to the current row, opening a row if none is. A cell
    /// spanning rows is registered at its grid column: the spans of the cells
    /// before it, plus the placeholders earlier rows owe to its left.
    pub fn begin_cell(&mut self, cell: TableCell, row_span: u32) {
        let Some(state) = self.current_mut() else {
            return;
        };
        if state.table.rows.is_empty() {
            state.row += 1;
            state.column = 0;
            state.table.rows.push(TableRow::default());
        }
        if row_span > 1 {
            let mut column = state
                .table
                .rows
                .last()
                .map_or(0, |r| r.cells.iter().map(TableCell::span).fold(0, u32::saturating_add));
            let mut owed: Vec<(u32, u32)> = state
                .row_spans
                .iter()
                .filter(|s| s.origin.0 < state.row)
                .map(|s| (s.origin.1, s.col_span))
                .collect();
            owed.sort_unstable();
            for (origin, col_span) in owed {
                if origin <= column {
                    column = column.saturating_add(col_span);
                }
            }
            state.row_spans.push(RowSpan {
                origin: (state.row, column),
                remaining: row_span - 1,
                col_span: cell.span(),
            });
        }
        if let Some(row) = state.table.rows.last_mut() {
            row.cells.push(cell);
        }
    }

    pub fn end_cell(&mut self) {
        if let Some(state) = self.current_mut() {
            if let Some(cell) = state.table.rows.last_mut().and_then(|r| r.cells.last_mut()) {
                if !matches!(cell.content.last(), Some(Block::Paragraph(_))) {
                    cell.content.push(Paragraph::default().into());
                }
            }
            state.column += 1;
        }
    }

    /// Back-fills the placeholders owed by spans from earlier rows, then
    /// drops the row if it is still empty.
    pub fn end_row(&mut self) {
        let Some(state) = self.current_mut() else {
            return;
        };
        let current_row = state.row;
        let Some(row) = state.table.rows.last_mut() else {
            return;
        };

        let mut owed: Vec<RowSpan> = state
            .row_spans
            .iter()
            .filter(|s| s.origin.0 != current_row)
            .copied()
            .collect();
        owed.sort_by_key(|s| s.origin.1);
        for span in &owed {
            let at = insertion_index(row, span.origin.1);
            row.cells.insert(at, placeholder(span.col_span));
        }

        for span in state.row_spans.iter_mut() {
            if span.origin.0 != current_row {
                span.remaining = span.remaining.saturating_sub(1);
            }
        }
        state.row_spans.retain(|s| s.remaining > 0);

        if row.cells.is_empty() {
            state.table.rows.pop();
            state.row -= 1;
        }
    }

    pub fn add_caption(&mut self, caption: Paragraph) {
        if let Some(state) = self.current_mut() {
            state.captions.push(caption);
        }
    }

    /// Last block container of the innermost table: the current cell.
    pub fn current_cell(&mut self) -> Option<&mut TableCell> {
        let state = self.current_mut()?;
        if state.table.rows.is_empty() {
            state.row += 1;
            state.column = 0;
            state.table.rows.push(TableRow::default());
        }
        let row = state.table.rows.last_mut()?;
        if row.cells.is_empty() {
            row.cells.push(TableCell::default());
        }
        row.cells.last_mut()
    }
}

/// Index of the first cell at or after grid column `column`.
fn insertion_index(row: &TableRow, column: u32) -> usize {
    let mut acc = 0u32;
    for (i, cell) in row.cells.iter().enumerate() {
        if acc >= column {
            return i;
        }
        acc = acc.saturating_add(cell.span());
    }
    row.cells.len()
}

fn placeholder(col_span: u32) -> TableCell {
    TableCell {
        props: TableCellProperties {
            width: Some(TableWidth::Dxa(0)),
            grid_span: (col_span > 1).then_some(col_span),
            v_merge: Some(VerticalMerge::Continue),
            ..Default::default()
        },
        content: vec![Paragraph::default().into()],
    }
}

/// Drops empty rows and declares one grid column per spanned column of the
/// widest row.
fn finalize(table: &mut Table) {
    table.rows.retain(|r| !r.cells.is_empty());
    let columns = table
        .rows
        .iter()
        .map(|r| r.cells.iter().map(TableCell::span).fold(0, u32::saturating_add))
        .max()
        .unwrap_or(0);
    if table.grid.len() < columns as usize {
        table.grid.resize(columns as usize, None);
    }
}
