//! Continuation links and the member names that carry them.

/// Default name of the collection member.
pub const DEFAULT_COLLECTION_FIELD: &str = "value";

/// Default name of the delta-link member.
pub const DEFAULT_DELTA_LINK_FIELD: &str = "@odata.deltaLink";

/// Default name of the next-link member.
pub const DEFAULT_NEXT_LINK_FIELD: &str = "@odata.nextLink";

/// Member names recognized by the parser at the root of a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    /// Member holding the array of records.
    pub collection: String,
    /// Member holding the link for the next change-tracking poll.
    pub delta_link: String,
    /// Member holding the link to the next page of the current poll.
    pub next_link: String,
}

impl FieldNames {
    /// Creates field names with the OData defaults.
    pub fn new() -> Self {
        Self {
            collection: DEFAULT_COLLECTION_FIELD.into(),
            delta_link: DEFAULT_DELTA_LINK_FIELD.into(),
            next_link: DEFAULT_NEXT_LINK_FIELD.into(),
        }
    }

    /// Sets the collection member name.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = name.into();
        self
    }

    /// Sets the delta-link member name.
    pub fn with_delta_link(mut self, name: impl Into<String>) -> Self {
        self.delta_link = name.into();
        self
    }

    /// Sets the next-link member name.
    pub fn with_next_link(mut self, name: impl Into<String>) -> Self {
        self.next_link = name.into();
        self
    }

    /// Returns the first empty or duplicated name, if any.
    pub fn conflict(&self) -> Option<&str> {
        let names = [&self.collection, &self.delta_link, &self.next_link];
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || names[i + 1..].contains(name) {
                return Some(name.as_str());
            }
        }
        None
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation links observed in one response body.
///
/// The flavor of a link is known only from the member that carried it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuation {
    /// Link to the next page of the same poll.
    pub next_link: Option<String>,
    /// Link for the next change-tracking poll.
    pub delta_link: Option<String>,
}

/// What the poll loop should do after a body has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep<'a> {
    /// Fetch the next page immediately.
    NextPage(&'a str),
    /// Wait for the poll interval, then fetch the delta.
    Delta(&'a str),
    /// The server offers no continuation; tracking ends.
    Stop,
}

impl Continuation {
    /// Creates a continuation with only a next-link.
    pub fn next(link: impl Into<String>) -> Self {
        Self {
            next_link: Some(link.into()),
            delta_link: None,
        }
    }

    /// Creates a continuation with only a delta-link.
    pub fn delta(link: impl Into<String>) -> Self {
        Self {
            next_link: None,
            delta_link: Some(link.into()),
        }
    }

    /// Decides the next step. A next-link wins over a delta-link.
    pub fn next_step(&self) -> NextStep<'_> {
        match (non_empty(&self.next_link), non_empty(&self.delta_link)) {
            (Some(next), _) => NextStep::NextPage(next),
            (None, Some(delta)) => NextStep::Delta(delta),
            (None, None) => NextStep::Stop,
        }
    }

    /// Returns true if neither link is present.
    pub fn is_empty(&self) -> bool {
        self.next_step() == NextStep::Stop
    }
}

fn non_empty(link: &Option<String>) -> Option<&str> {
    link.as_deref().filter(|s| !s.is_empty())
}
