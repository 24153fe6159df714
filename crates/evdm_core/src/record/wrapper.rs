//! Handles over a closed set of record types.

/// Declares an enum holding an [`Object`](crate::Object) of one of several
/// record types.
///
/// Each variant wraps exactly one record type; listing a type twice fails
/// to compile because of the conflicting `From` impls. The generated enum
/// reports the held record's id, tests its type without consuming it, and
/// hands back a typed handle.
///
/// ```
/// use evdm_core::{record_handle, MutableObject, Record};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// # pub struct Energy { pub value: f32 }
/// # pub struct Track;
/// # impl Record for Track { type Data = Energy; const TYPE_NAME: &'static str = "Track"; }
/// # pub struct Shower;
/// # impl Record for Shower { type Data = Energy; const TYPE_NAME: &'static str = "Shower"; }
///
/// record_handle! {
///     /// Anything a reconstructed particle can be built from.
///     pub enum Candidate {
///         Track(Track),
///         Shower(Shower),
///     }
/// }
///
/// let candidate = Candidate::from(MutableObject::<Track>::new());
/// assert!(candidate.is_current_type::<Track>());
/// assert!(candidate.get_value::<Shower>().is_err());
/// assert!(candidate.get_value::<Track>().is_ok());
/// ```
#[macro_export]
macro_rules! record_handle {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident ( $record:ty ) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        $vis enum $name {
            $(
                #[allow(missing_docs)]
                $variant($crate::Object<$record>),
            )+
        }

        impl $name {
            /// Returns the id of the held record.
            #[must_use]
            pub fn object_id(&self) -> $crate::ObjectId {
                match self {
                    $( Self::$variant(obj) => obj.object_id(), )+
                }
            }

            /// Returns the value type name of the held record.
            #[must_use]
            pub fn type_name(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => <$record as $crate::Record>::TYPE_NAME, )+
                }
            }

            /// Returns `true` if the held record is a `U`.
            #[must_use]
            pub fn is_current_type<U: $crate::Record>(&self) -> bool {
                match self {
                    $(
                        Self::$variant(_) => {
                            ::std::any::TypeId::of::<U>() == ::std::any::TypeId::of::<$record>()
                        }
                    )+
                }
            }

            /// Returns a typed handle onto the held record.
            ///
            /// # Errors
            ///
            /// Returns a type mismatch if the held record is not a `U`.
            pub fn get_value<U: $crate::Record>(&self) -> $crate::CoreResult<$crate::Object<U>> {
                match self {
                    $(
                        Self::$variant(obj) => obj.cast::<U>().ok_or_else(|| {
                            $crate::CoreError::type_mismatch(
                                <U as $crate::Record>::TYPE_NAME,
                                <$record as $crate::Record>::TYPE_NAME,
                            )
                        }),
                    )+
                }
            }
        }

        $(
            impl ::std::convert::From<$crate::Object<$record>> for $name {
                fn from(obj: $crate::Object<$record>) -> Self {
                    Self::$variant(obj)
                }
            }

            impl ::std::convert::From<$crate::MutableObject<$record>> for $name {
                fn from(obj: $crate::MutableObject<$record>) -> Self {
                    Self::$variant(obj.freeze())
                }
            }
        )+
    };
}
