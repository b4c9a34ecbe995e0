//! Bluetooth LE peripheral stack over a user-provided HCI transport.
//!
//! The stack is single-threaded and event-driven. The embedder owns the HCI
//! channel (typically a raw HCI socket), feeds inbound packets into
//! [`ble::Peripheral::on_data`], and drives a one-second tick for device
//! polling. Outbound traffic goes through the [`host::Transport`] trait.
//! Application-visible events are delivered on a typed channel returned by
//! [`ble::Peripheral::new`].

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

/// Provides a [`Display`](std::fmt::Display) implementation that forwards to
/// [`Debug`](std::fmt::Debug).
macro_rules! impl_display_via_debug {
    ($($t:ty),* $(,)?) => {$(
        impl ::std::fmt::Display for $t {
            #[inline]
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Debug::fmt(self, f)
            }
        }
    )*};
}
pub(crate) use impl_display_via_debug;

pub mod acl;
pub mod att;
pub mod ble;
pub mod gap;
pub mod gatt;
pub mod hci;
pub mod host;
pub mod le;
pub mod smp;
