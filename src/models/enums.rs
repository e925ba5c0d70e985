//! Shared domain enums

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};

// ---------------------------------------------------------------------------
// BorrowingStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a borrowing record.
///
/// `Pending` is kept for a future reservation-before-pickup flow; no
/// operation of the engine produces or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Pending,
    Borrowed,
    Returned,
    Overdue,
}

impl BorrowingStatus {
    /// States counted by the one-active-loan-per-(book, patron) guard
    pub const ACTIVE: [BorrowingStatus; 3] =
        [BorrowingStatus::Pending, BorrowingStatus::Borrowed, BorrowingStatus::Overdue];

    /// States a return can close
    pub const RETURNABLE: [BorrowingStatus; 2] = [BorrowingStatus::Borrowed, BorrowingStatus::Overdue];

    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Pending => "pending",
            BorrowingStatus::Borrowed => "borrowed",
            BorrowingStatus::Returned => "returned",
            BorrowingStatus::Overdue => "overdue",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// Whether the lending state machine allows `self -> next`
    pub fn can_transition_to(&self, next: BorrowingStatus) -> bool {
        matches!(
            (self, next),
            (BorrowingStatus::Borrowed, BorrowingStatus::Returned)
                | (BorrowingStatus::Borrowed, BorrowingStatus::Overdue)
                | (BorrowingStatus::Overdue, BorrowingStatus::Returned)
        )
    }
}

impl FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BorrowingStatus::Pending),
            "borrowed" => Ok(BorrowingStatus::Borrowed),
            "returned" => Ok(BorrowingStatus::Returned),
            "overdue" => Ok(BorrowingStatus::Overdue),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BorrowingStatus::Pending => "Pending",
            BorrowingStatus::Borrowed => "Borrowed",
            BorrowingStatus::Returned => "Returned",
            BorrowingStatus::Overdue => "Overdue",
        };
        write!(f, "{}", label)
    }
}

// SQLx conversion for BorrowingStatus (stored as TEXT)
impl sqlx::Type<Postgres> for BorrowingStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for BorrowingStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for BorrowingStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

// ---------------------------------------------------------------------------
// RecordScope
// ---------------------------------------------------------------------------

/// Which rows a lookup may see with respect to soft deletion.
///
/// The caller picks the scope; repositories never filter implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordScope {
    #[default]
    ActiveOnly,
    IncludeDeleted,
}

impl RecordScope {
    pub fn admits(&self, deleted: bool) -> bool {
        match self {
            RecordScope::ActiveOnly => !deleted,
            RecordScope::IncludeDeleted => true,
        }
    }
}
