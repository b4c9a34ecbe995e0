//! Generic Attribute Profile server ([Vol 3] Part G).

pub use {consts::*, io::*, schema::*, server::*};

use crate::att::*;

mod consts;
mod db;
mod io;
mod schema;
mod server;
