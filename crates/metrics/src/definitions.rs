//! Metric name and label definitions.
//!
//! All metric names used by strongbox live here so the set of exported
//! metrics is documented in one place.

/// Credential vault metrics
pub mod vault {
    /// Commit batches run
    pub const COMMITS_TOTAL: &str = "strongbox_vault_commits_total";
    /// Staged changes applied, by kind (addition, edit, deletion)
    pub const CHANGES_APPLIED_TOTAL: &str = "strongbox_vault_changes_applied_total";
    /// Staged changes that failed and were kept for retry, by kind
    pub const COMMIT_FAILURES_TOTAL: &str = "strongbox_vault_commit_failures_total";
    /// Keys removed because the record they were generated for was not written
    pub const COMPENSATIONS_TOTAL: &str = "strongbox_vault_compensations_total";
    /// Keys removed by the orphan sweep
    pub const ORPHAN_KEYS_SWEPT_TOTAL: &str = "strongbox_vault_orphan_keys_swept_total";
    /// Records that failed to decrypt on read
    pub const DECRYPT_FAILURES_TOTAL: &str = "strongbox_vault_decrypt_failures_total";
    /// Daily backups written
    pub const BACKUPS_TOTAL: &str = "strongbox_vault_backups_total";
    /// Duration of a commit batch in seconds
    pub const COMMIT_DURATION_SECONDS: &str = "strongbox_vault_commit_duration_seconds";
}

/// Common label keys
pub mod labels {
    pub const KIND: &str = "kind";
}

/// Standard histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Commit duration buckets (in seconds)
    /// Covers 100µs to 10s; a batch is dominated by fsyncs of new key files
    pub static COMMIT_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
        ]
    });
}
