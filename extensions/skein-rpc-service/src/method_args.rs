use crate::Codec;
use serde::{Serialize, de::DeserializeOwned};
use skein::rpc::{CodecError, RpcError};
use std::any::type_name;

/// A typed argument list for a remote method.
///
/// Implemented for tuples of up to four elements. The tuple shape is the
/// method's parameter signature: `param_types()` produces the descriptors sent
/// on the wire, `encode` produces one codec-encoded value per parameter, and
/// `decode` reverses it on the receiving side.
///
/// Descriptors are `std::any::type_name` strings, which include the module
/// path of each type. Client and server must therefore build their argument
/// types from the same definition crate, or no overload will match.
///
/// ```rust
/// use skein_rpc_service::{BitcodeCodec, MethodArgs};
///
/// let values = (7u64, "ada".to_string()).encode(&BitcodeCodec).unwrap();
/// assert_eq!(values.len(), 2);
/// assert_eq!(<(u64, String)>::param_types().len(), 2);
/// ```
pub trait MethodArgs: Sized + Send + 'static {
    /// Number of parameters.
    const ARITY: usize;

    fn param_types() -> Vec<String>;

    fn encode<K: Codec>(&self, codec: &K) -> Result<Vec<Vec<u8>>, CodecError>;

    fn decode<K: Codec>(codec: &K, values: &[Vec<u8>]) -> Result<Self, RpcError>;
}

fn check_arity(expected: usize, values: &[Vec<u8>]) -> Result<(), RpcError> {
    if values.len() != expected {
        return Err(RpcError::ArgumentMismatch(format!(
            "expected {} argument(s), got {}",
            expected,
            values.len()
        )));
    }
    Ok(())
}

macro_rules! one {
    ($name:ident) => {
        1
    };
}

macro_rules! impl_method_args {
    ($($name:ident : $idx:tt),*) => {
        impl<$($name),*> MethodArgs for ($($name,)*)
        where
            $($name: Serialize + DeserializeOwned + Send + 'static,)*
        {
            const ARITY: usize = 0 $(+ one!($name))*;

            fn param_types() -> Vec<String> {
                vec![$(type_name::<$name>().to_string()),*]
            }

            #[allow(unused_variables)]
            fn encode<K: Codec>(&self, codec: &K) -> Result<Vec<Vec<u8>>, CodecError> {
                Ok(vec![$(codec.serialize(&self.$idx)?),*])
            }

            #[allow(unused_variables)]
            fn decode<K: Codec>(codec: &K, values: &[Vec<u8>]) -> Result<Self, RpcError> {
                check_arity(Self::ARITY, values)?;
                Ok(($(codec.deserialize::<$name>(&values[$idx])?,)*))
            }
        }
    };
}

impl_method_args!();
impl_method_args!(A: 0);
impl_method_args!(A: 0, B: 1);
impl_method_args!(A: 0, B: 1, C: 2);
impl_method_args!(A: 0, B: 1, C: 2, D: 3);
