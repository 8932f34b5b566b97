//! Inkpost - blog backend authentication
//!
//! Dual-token sessions for the blog: a short-lived signed identity token sent
//! with every request, and an opaque refresh credential kept in a cookie and
//! exchanged for the identity token.

pub mod core;
