/*!
Shared bit-level primitives for the loupe workspace.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

pub mod bit;
