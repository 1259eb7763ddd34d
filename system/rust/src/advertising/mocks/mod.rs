//! Mocked collaborators of the advertising manager, for use in tests.

pub mod mock_hci;
pub mod mock_rpa;
