pub mod error_stage {
    pub const RECEIVING: &str = "receiving";
    pub const PROCESSING: &str = "processing";
}

pub mod error_type {
    /// The data could not be parsed.
    pub const PARSER_FAILED: &str = "parser_failed";
    /// A lookup against shared state did not yield a usable value.
    pub const CONDITION_FAILED: &str = "condition_failed";
    /// A configured limit refused the operation.
    pub const ACQUIRE_FAILED: &str = "acquire_failed";
}
