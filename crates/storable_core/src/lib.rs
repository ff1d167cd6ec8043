//! Public library API for reading and writing Perl `Storable` binary images.

/// Tag catalog, header handling, value graph, decoder, encoder, and file helpers.
pub mod format;
