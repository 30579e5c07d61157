//! Internal utility types.

/// Marker type used when type-erasing payload records.
///
/// This zero-sized type serves as a placeholder in generic type parameters
/// when the actual concrete callable type has been erased. For example,
/// `PayloadRecord<Erased, I, A>` represents a record whose stored callable
/// is unknown at the current scope.
///
/// Using a distinct marker type (rather than `()`) makes the intent clearer
/// in type signatures and error messages.
pub(crate) struct Erased;
