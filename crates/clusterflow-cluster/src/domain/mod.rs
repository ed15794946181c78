/// Cluster aggregate, backup records, demand validation
pub mod cluster;

/// Cluster repository trait and in-memory implementation
pub mod repository;

/// `{cpu}C{memory}G` host spec codes
pub mod spec_code;
