use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Open,
    Assigned,
    Completed,
    Closed,
}

impl ListingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Open => "open",
            ListingStatus::Assigned => "assigned",
            ListingStatus::Completed => "completed",
            ListingStatus::Closed => "closed",
        }
    }

    pub fn can_transition_to(self, next: ListingStatus) -> bool {
        use ListingStatus::*;
        matches!(
            (self, next),
            (Draft, Open)
                | (Open, Assigned)
                | (Open, Closed)
                | (Assigned, Completed)
                | (Assigned, Closed)
        )
    }

    /// Owners may edit content only before a provider is assigned.
    pub const fn is_editable(self) -> bool {
        matches!(self, ListingStatus::Draft | ListingStatus::Open)
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(ListingStatus::Draft),
            "open" => Ok(ListingStatus::Open),
            "assigned" => Ok(ListingStatus::Assigned),
            "completed" => Ok(ListingStatus::Completed),
            "closed" => Ok(ListingStatus::Closed),
            other => Err(format!("unknown listing status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ApplicationStatus::Pending),
            "accepted" => Ok(ApplicationStatus::Accepted),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "withdrawn" => Ok(ApplicationStatus::Withdrawn),
            other => Err(format!("unknown application status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ListingStatus::*;
    use super::*;

    #[test]
    fn listing_transitions_follow_lifecycle() {
        assert!(Draft.can_transition_to(Open));
        assert!(Open.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Completed));
        assert!(Open.can_transition_to(Closed));

        assert!(!Open.can_transition_to(Draft));
        assert!(!Draft.can_transition_to(Assigned));
        assert!(!Draft.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Completed.can_transition_to(Closed));
    }

    #[test]
    fn only_draft_and_open_are_editable() {
        assert!(Draft.is_editable());
        assert!(Open.is_editable());
        assert!(!Assigned.is_editable());
        assert!(!Closed.is_editable());
    }

    #[test]
    fn statuses_parse_from_storage_strings() {
        assert_eq!("assigned".parse::<ListingStatus>().unwrap(), Assigned);
        assert!("archived".parse::<ListingStatus>().is_err());
        assert_eq!(
            "withdrawn".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::Withdrawn
        );
    }
}
