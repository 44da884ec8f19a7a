use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{AgentError, TraderResult},
    gym::trading::position::Direction,
};

/// The discrete decision an agent takes at every bar.
///
/// The discriminants are the Q-network output indices and must stay stable:
/// `Hold = 0`, `OpenLong = 1`, `OpenShort = 2`, `Close = 3`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    EnumCount,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Action {
    #[default]
    Hold = 0,
    OpenLong = 1,
    OpenShort = 2,
    Close = 3,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Maps a network output index back to an action.
    ///
    /// # Errors
    /// [`AgentError::UnknownAction`] for indices outside `0..Action::COUNT`.
    pub fn from_index(index: usize) -> TraderResult<Self> {
        match index {
            0 => Ok(Self::Hold),
            1 => Ok(Self::OpenLong),
            2 => Ok(Self::OpenShort),
            3 => Ok(Self::Close),
            other => Err(AgentError::UnknownAction(other).into()),
        }
    }

    /// Direction requested by an open action, `None` otherwise.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::OpenLong => Some(Direction::Long),
            Self::OpenShort => Some(Direction::Short),
            Self::Hold | Self::Close => None,
        }
    }

    pub fn is_open(self) -> bool {
        self.direction().is_some()
    }
}

impl TryFrom<usize> for Action {
    type Error = crate::error::TraderError;

    fn try_from(index: usize) -> TraderResult<Self> {
        Self::from_index(index)
    }
}

impl From<Action> for usize {
    fn from(action: Action) -> Self {
        action.index()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;
    use crate::error::{ErrorKind, TraderError};

    #[test]
    fn indices_are_stable() {
        let indices: Vec<usize> = Action::iter().map(Action::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(Action::COUNT, 4);
        for action in Action::iter() {
            assert_eq!(Action::from_index(action.index()).unwrap(), action);
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = Action::try_from(4).unwrap_err();
        assert!(matches!(err, TraderError::Agent(AgentError::UnknownAction(4))));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Action::from_str("OPEN_LONG").unwrap(), Action::OpenLong);
        assert_eq!(Action::Close.as_str(), "close");
        assert_eq!(Action::OpenShort.direction(), Some(Direction::Short));
        assert!(!Action::Hold.is_open());
    }
}
