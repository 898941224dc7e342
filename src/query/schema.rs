/// Storage kind of a field, used to coerce query-string values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Id,
    Text,
    Number,
    #[cfg(test)]
    Bool,
    Date,
    List,
    Object,
}

impl FieldKind {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldKind::List | FieldKind::Object)
    }

    /// Range operators make sense only for ordered kinds.
    pub fn is_ordered(&self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Date | FieldKind::Text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Whitelist of client-visible fields for one collection. `hidden` fields
/// are stored but never filtered, sorted or returned by listings.
#[derive(Debug)]
pub struct ResourceSchema {
    pub fields: &'static [FieldSpec],
    pub hidden: &'static [&'static str],
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        if self.is_hidden(name) {
            return None;
        }
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden.contains(&name)
    }

    pub fn hidden_fields(&self) -> Vec<String> {
        self.hidden.iter().map(|f| f.to_string()).collect()
    }
}
