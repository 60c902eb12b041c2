#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid month {0}, expected 1-12")]
    InvalidMonth(u8),
    #[error("invalid year {0}")]
    InvalidYear(i32),
    #[error("unknown OBIS code '{0}'")]
    UnknownCode(String),
    #[error("malformed OBIS code '{0}': expected '<medium>-<channel>:<1|2>.<...>'")]
    MalformedCode(String),
    #[error("OBIS code '{0}' registered twice")]
    DuplicateCode(String),
}
