//! Shared sheetflow data model.
//!
//! Pure data types used by the engine, the table store and the CLI:
//! primitive values, cell references, sheets, tables, the values carried on
//! pipeline edges and the block error taxonomy.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cell;
pub mod error;
pub mod ids;
pub mod io;
pub mod sheet;
pub mod table;
pub mod value;
