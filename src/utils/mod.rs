/// Provide interoperability with fabric C return values.
pub(crate) mod interop;
