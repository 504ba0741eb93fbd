use super::tree::AddressError;
use crate::api::ApiError;

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Address(#[from] AddressError),
}
