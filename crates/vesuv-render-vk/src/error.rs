// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Failures on the frame-presentation path. Each variant names the failing
/// driver call. None of these are retried; a stale swapchain is not an error.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The driver rejected an object-creation call.
    #[error("{op} failed: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    /// Beginning, resetting or ending a command buffer failed.
    #[error("command recording ({op}) failed: {source}")]
    Record {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("queue_submit rejected: {0}")]
    Submission(#[source] vk::Result),

    /// Acquire or present failed with something other than staleness.
    #[error("{op} failed: {source}")]
    Presentation {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    /// A fence wait/reset or device-idle wait failed.
    #[error("{op} failed: {source}")]
    Sync {
        op: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("unsupported surface: {0}")]
    Unsupported(&'static str),
}

impl RenderError {
    pub(crate) fn device(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::Device { op, source }
    }

    pub(crate) fn record(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::Record { op, source }
    }

    pub(crate) fn presentation(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::Presentation { op, source }
    }

    pub(crate) fn sync(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::Sync { op, source }
    }

    /// The driver result behind this error, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Device { source, .. }
            | Self::Record { source, .. }
            | Self::Presentation { source, .. }
            | Self::Sync { source, .. }
            | Self::Submission(source) => Some(*source),
            Self::Unsupported(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_the_operation() {
        let err = RenderError::presentation("queue_present")(vk::Result::ERROR_DEVICE_LOST);
        let msg = err.to_string();
        assert!(msg.starts_with("queue_present failed"), "{msg}");
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn submission_keeps_source() {
        let err = RenderError::Submission(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert!(std::error::Error::source(&err).is_some());
        assert!(RenderError::Unsupported("no formats").vk_result().is_none());
    }
}
