//! Domain layer: pointers, memo records and errors.

pub mod bcmr;
pub mod entities;
pub mod errors;

pub use bcmr::{
    encode_bcmr_op_return, encode_push, parse_bcmr_from_bytecodes, parse_bcmr_op_return,
    parse_op_return_pushes, BcmrParseError, BcmrPointer, BCMR_SIGNATURE,
};
pub use entities::{
    AuthChainEntry, AuthChainFetchMem, AuthChainMemItem, AuthChainMemTransaction,
    FetchAuthChainResult,
};
pub use errors::AuthChainError;
