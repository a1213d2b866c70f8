//! JSON snapshot of the result view

use crate::session::SessionView;
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, view: &SessionView) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, view)?;
    writeln!(writer)
}
