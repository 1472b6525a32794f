/// Raw map data as it appears in the .osm file. Elements keep their
/// attributes and nested tags untouched; all interpretation happens in the
/// shaping pass.

pub mod osm;
