//! Database connections inside a data-source document.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, unknown_variant};
use crate::xml::{AttrBag, XmlElement};

/// Backends that keep the logical database name in `schema` instead of `dbname`.
const SCHEMA_KEYED_CLASSES: &[&str] = &["oracle", "teradata"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    UsernamePassword,
    Integrated,
    None,
}

impl AuthMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::UsernamePassword => "username-password",
            AuthMode::Integrated => "sspi",
            AuthMode::None => "auth-none",
        }
    }
}

impl FromStr for AuthMode {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "username-password" | "username" => Ok(AuthMode::UsernamePassword),
            "sspi" | "integrated" => Ok(AuthMode::Integrated),
            "auth-none" | "none" => Ok(AuthMode::None),
            other => Err(unknown_variant(
                "auth_mode",
                other,
                &["username-password", "sspi", "auth-none"],
            )),
        }
    }
}

/// Where a connection came from, which decides how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionOrigin {
    /// Ordinal among the snapshot's database connection elements.
    Loaded(usize),
    Built,
}

/// Federated wrapper identity: `<named-connection caption=... name=...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedConnection {
    pub name: String,
    pub caption: String,
}

/// Returned by `add_connection`; resolves back to the connection it created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub(crate) index: usize,
    name: Option<String>,
}

impl ConnectionHandle {
    pub(crate) fn new(index: usize, name: Option<String>) -> Self {
        Self { index, name }
    }

    /// Named-connection token, `None` for legacy documents.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    named: Option<NamedConnection>,
    attrs: AttrBag,
    pub(crate) origin: ConnectionOrigin,
}

impl Connection {
    pub(crate) fn build(
        class: &str,
        server: &str,
        database: &str,
        auth: AuthMode,
        initial_sql: Option<&str>,
        named: Option<NamedConnection>,
    ) -> Self {
        let mut conn = Connection {
            named,
            attrs: AttrBag::new(),
            origin: ConnectionOrigin::Built,
        };
        conn.attrs.upsert("class", class);
        conn.set_database(database);
        conn.attrs.upsert("server", server);
        conn.attrs.upsert("authentication", auth.as_str());
        if let Some(sql) = initial_sql {
            conn.attrs.upsert("one-time-sql", sql);
        }
        conn
    }

    pub(crate) fn from_element(
        element: &XmlElement,
        named: Option<NamedConnection>,
        ordinal: usize,
    ) -> Self {
        Connection {
            named,
            attrs: element.attrs.clone(),
            origin: ConnectionOrigin::Loaded(ordinal),
        }
    }

    pub fn named(&self) -> Option<&NamedConnection> {
        self.named.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.named.as_ref().map(|n| n.name.as_str())
    }

    pub fn class(&self) -> &str {
        self.attrs.get("class").unwrap_or_default()
    }

    pub fn server(&self) -> Option<&str> {
        self.attrs.get("server")
    }

    pub fn is_schema_keyed(&self) -> bool {
        SCHEMA_KEYED_CLASSES.contains(&self.class())
    }

    fn database_slot(&self) -> &'static str {
        if self.is_schema_keyed() {
            "schema"
        } else {
            "dbname"
        }
    }

    /// Logical database name, read from `schema` for schema-keyed backends.
    pub fn database(&self) -> Option<&str> {
        self.attrs.get(self.database_slot())
    }

    pub fn username(&self) -> Option<&str> {
        self.attrs.get("username")
    }

    pub fn port(&self) -> Option<&str> {
        self.attrs.get("port")
    }

    pub fn authentication(&self) -> Option<&str> {
        self.attrs.get("authentication")
    }

    pub fn initial_sql(&self) -> Option<&str> {
        self.attrs.get("one-time-sql")
    }

    pub fn attrs(&self) -> &AttrBag {
        &self.attrs
    }

    pub fn set_server(&mut self, server: &str) -> &mut Self {
        self.attrs.upsert("server", server);
        if let Some(named) = self.named.as_mut() {
            named.caption = server.to_string();
        }
        self
    }

    pub fn set_database(&mut self, database: &str) -> &mut Self {
        let slot = self.database_slot();
        self.attrs.upsert(slot, database);
        self
    }

    pub fn set_username(&mut self, username: &str) -> &mut Self {
        self.attrs.upsert("username", username);
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.attrs.upsert("port", port.to_string());
        self
    }

    pub fn set_authentication(&mut self, auth: AuthMode) -> &mut Self {
        self.attrs.upsert("authentication", auth.as_str());
        self
    }

    pub fn set_initial_sql(&mut self, sql: Option<&str>) -> &mut Self {
        match sql {
            Some(sql) => {
                self.attrs.upsert("one-time-sql", sql);
            }
            None => {
                self.attrs.remove("one-time-sql");
            }
        }
        self
    }

    /// The bare `<connection>` element.
    pub(crate) fn to_element(&self) -> XmlElement {
        XmlElement {
            name: "connection".to_string(),
            attrs: self.attrs.clone(),
            children: Vec::new(),
        }
    }

    /// `<named-connection>` wrapping the bare element; legacy connections
    /// render bare.
    pub(crate) fn to_wrapped_element(&self) -> XmlElement {
        match &self.named {
            Some(named) => XmlElement::new("named-connection")
                .with_attr("caption", named.caption.as_str())
                .with_attr("name", named.name.as_str())
                .with_child(self.to_element()),
            None => self.to_element(),
        }
    }

    /// Writes this connection's attributes over a loaded element.
    pub(crate) fn apply_to(&self, element: &mut XmlElement) {
        element.attrs = self.attrs.clone();
    }
}

/// Generates a `<class>.<digits>` token that is not in `taken`.
pub(crate) fn generate_connection_name(class: &str, taken: &[&str]) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: u64 = rng.gen_range(1_000_000_000_000_000..10_000_000_000_000_000);
        let name = format!("{class}.{suffix}");
        if !taken.contains(&name.as_str()) {
            return name;
        }
    }
}
