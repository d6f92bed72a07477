use std::{fmt, sync::Arc};

use crate::{
    live::{substitute, Declaring, LiveTypeRc},
    metadata::{flags::FieldAttributes, token::Token},
};

/// Shared handle to a [`LiveField`]
pub type LiveFieldRc = Arc<LiveField>;
/// Shared handle to a [`LiveProperty`]
pub type LivePropertyRc = Arc<LiveProperty>;
/// Shared handle to a [`LiveEvent`]
pub type LiveEventRc = Arc<LiveEvent>;

/// A field as the running execution engine exposes it.
pub struct LiveField {
    /// Metadata token
    pub token: Token,
    /// Field name
    pub name: String,
    /// Field type, substituted on generic instances
    pub field_type: LiveTypeRc,
    /// Field attributes
    pub attributes: FieldAttributes,
    declaring: Declaring,
}

impl LiveField {
    pub(crate) fn new(
        token: Token,
        name: String,
        field_type: LiveTypeRc,
        attributes: FieldAttributes,
        declaring: Declaring,
    ) -> Self {
        LiveField {
            token,
            name,
            field_type,
            attributes,
            declaring,
        }
    }

    pub(crate) fn bound(field: &LiveField, instance: &LiveTypeRc, field_type: LiveTypeRc) -> Self {
        LiveField {
            token: field.token,
            name: field.name.clone(),
            field_type,
            attributes: field.attributes,
            declaring: Declaring::of(instance),
        }
    }

    /// The declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> Option<LiveTypeRc> {
        self.declaring.get()
    }

    /// Whether the field is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }
}

impl fmt::Display for LiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.declaring_type() {
            Some(declaring) => write!(f, "{} {declaring}::{}", self.field_type, self.name),
            None => write!(f, "{} {}", self.field_type, self.name),
        }
    }
}

impl fmt::Debug for LiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveField")
            .field("token", &self.token)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A property as the running execution engine exposes it.
pub struct LiveProperty {
    /// Metadata token
    pub token: Token,
    /// Property name
    pub name: String,
    /// Property type
    pub property_type: LiveTypeRc,
    /// Indexer parameter types
    pub parameters: Vec<LiveTypeRc>,
    declaring: Declaring,
}

impl LiveProperty {
    pub(crate) fn new(
        token: Token,
        name: String,
        property_type: LiveTypeRc,
        parameters: Vec<LiveTypeRc>,
        declaring: Declaring,
    ) -> Self {
        LiveProperty {
            token,
            name,
            property_type,
            parameters,
            declaring,
        }
    }

    pub(crate) fn bound(
        property: &LiveProperty,
        instance: &LiveTypeRc,
        property_type: LiveTypeRc,
    ) -> Self {
        let type_args = instance.generic_arguments();
        let parameters = property
            .parameters
            .iter()
            .map(|parameter| substitute(parameter, type_args, &[]))
            .collect();

        LiveProperty {
            token: property.token,
            name: property.name.clone(),
            property_type,
            parameters,
            declaring: Declaring::of(instance),
        }
    }

    /// The declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> Option<LiveTypeRc> {
        self.declaring.get()
    }
}

impl fmt::Debug for LiveProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveProperty")
            .field("token", &self.token)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// An event as the running execution engine exposes it.
pub struct LiveEvent {
    /// Metadata token
    pub token: Token,
    /// Event name
    pub name: String,
    /// Delegate type
    pub event_type: LiveTypeRc,
    declaring: Declaring,
}

impl LiveEvent {
    pub(crate) fn new(token: Token, name: String, event_type: LiveTypeRc, declaring: Declaring) -> Self {
        LiveEvent {
            token,
            name,
            event_type,
            declaring,
        }
    }

    pub(crate) fn bound(event: &LiveEvent, instance: &LiveTypeRc, event_type: LiveTypeRc) -> Self {
        LiveEvent {
            token: event.token,
            name: event.name.clone(),
            event_type,
            declaring: Declaring::of(instance),
        }
    }

    /// The declaring type.
    #[must_use]
    pub fn declaring_type(&self) -> Option<LiveTypeRc> {
        self.declaring.get()
    }
}

impl fmt::Debug for LiveEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveEvent")
            .field("token", &self.token)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
