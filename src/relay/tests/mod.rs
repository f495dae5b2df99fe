//! Adaptor, wire and transport tests.
