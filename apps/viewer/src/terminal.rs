//! Terminal rendering of the two panels, the greeting and the record table.

use std::sync::{Arc, Mutex, PoisonError};

use client_core::{UserNotifier, ViewPort};
use shared::domain::{Panel, TableRow, ViewState, COLUMNS};

/// Keeps the projected state and reprints it whenever the table changes,
/// which is the last update of every transition.
#[derive(Clone, Default)]
pub struct TerminalView {
    state: Arc<Mutex<ViewState>>,
}

impl TerminalView {
    pub fn snapshot(&self) -> ViewState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn print(&self) {
        println!("{}", render_view(&self.snapshot()));
    }

    fn update(&self, apply: impl FnOnce(&mut ViewState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
    }
}

impl ViewPort for TerminalView {
    fn set_panel(&mut self, panel: Panel) {
        self.update(|state| state.panel = panel);
    }

    fn set_greeting(&mut self, greeting: Option<&str>) {
        self.update(|state| state.greeting = greeting.map(str::to_string));
    }

    fn set_rows(&mut self, rows: &[TableRow]) {
        self.update(|state| state.rows = rows.to_vec());
        self.print();
    }
}

/// Prints a highlighted notice on stderr and returns at once. Unlike a
/// browser alert it does not wait for acknowledgement: stdin already carries
/// the command loop, so reading a keypress here would swallow a command.
pub struct TerminalNotifier;

impl UserNotifier for TerminalNotifier {
    fn alert(&self, message: &str) {
        eprintln!("\n!! {message}\n");
    }
}

pub fn render_view(state: &ViewState) -> String {
    match state.panel {
        Panel::SignedOut => "[signed out] type `sign-in` to continue".to_string(),
        Panel::SignedIn => {
            let mut out = String::from("[signed in] type `sign-out` to leave\n");
            if let Some(greeting) = &state.greeting {
                out.push_str(greeting);
                out.push('\n');
            }
            out.push_str(&render_table(&state.rows));
            out
        }
    }
}

pub fn render_table(rows: &[TableRow]) -> String {
    let mut widths = COLUMNS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 5]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = line(COLUMNS);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows {
        out.push('\n');
        let cells = row.cells();
        out.push_str(&line([
            cells[0].as_str(),
            cells[1].as_str(),
            cells[2].as_str(),
            cells[3].as_str(),
            cells[4].as_str(),
        ]));
    }
    out
}
