//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data in the
//! corresponding `*_statuses` table, and each variant's wire name is the
//! seeded `name` column value.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Map a database status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The seeded lookup-table name, used in API payloads.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Brokered request lifecycle status.
    RequestStatus {
        PendingApproval = 1 => "PENDING_APPROVAL",
        Approved = 2 => "APPROVED",
        Denied = 3 => "DENIED",
        Expired = 4 => "EXPIRED",
        Executing = 5 => "EXECUTING",
        Succeeded = 6 => "SUCCEEDED",
        Failed = 7 => "FAILED",
    }
}

define_status_enum! {
    /// Git proxy session lifecycle status.
    GitSessionStatus {
        PendingApproval = 1 => "PENDING_APPROVAL",
        Approved = 2 => "APPROVED",
        Denied = 3 => "DENIED",
        Expired = 4 => "EXPIRED",
        Active = 5 => "ACTIVE",
        Used = 6 => "USED",
    }
}
