// SPDX-License-Identifier: Apache-2.0

//! Qualified name construction
//!
//! A qualified name is the natural key of an entity: a `::`-separated path of
//! `(TypeName)=discriminator` segments, starting at a root entity. Type names
//! never contain `)`, so two segments under the same parent are equal only if
//! both type and discriminator are equal.

use crate::catalog::{EntityKind, TypeCatalog};

pub const SEPARATOR: &str = "::";

/// Appended to an owner's name to form the discriminator of its type node
pub const TYPE_SUFFIX: &str = "_type";

/// Builds the qualified name of a child of `parent`
///
/// An empty parent yields a root name.
pub fn build(parent: &str, type_name: &str, discriminator: &str) -> String {
    let segment = format!("({})={}", type_name, discriminator);
    if parent.is_empty() {
        segment
    } else {
        format!("{}{}{}", parent, SEPARATOR, segment)
    }
}

/// Discriminator of the type node attached to `owner`
pub fn type_discriminator(owner: &str) -> String {
    format!("{}{}", owner, TYPE_SUFFIX)
}

/// Host part of a `host:port` network address
pub fn host_of(network_address: &str) -> &str {
    network_address
        .split(':')
        .next()
        .unwrap_or(network_address)
}

/// Qualified name of a software server
pub fn software_server(catalog: &TypeCatalog, host: &str) -> String {
    build("", catalog.entity_name(EntityKind::SoftwareServer), host)
}

/// Qualified name of a database hosted by a software server
pub fn database(catalog: &TypeCatalog, host: &str, database_name: &str) -> String {
    build(
        &software_server(catalog, host),
        catalog.entity_name(EntityKind::Database),
        database_name,
    )
}

/// Canonical qualified name of an information view
///
/// Shared by the create and retract paths; both must produce the same bytes.
pub fn information_view(
    catalog: &TypeCatalog,
    host: &str,
    database_name: &str,
    schema_name: &str,
) -> String {
    build(
        &database(catalog, host, database_name),
        catalog.entity_name(EntityKind::InformationView),
        schema_name,
    )
}

/// Qualified names of the table-level nodes under a schema container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub table: String,
    pub table_type: String,
}

impl TableNames {
    pub fn new(catalog: &TypeCatalog, container: &str, table_name: &str) -> Self {
        Self {
            table: build(
                container,
                catalog.entity_name(EntityKind::RelationalTable),
                table_name,
            ),
            table_type: build(
                container,
                catalog.entity_name(EntityKind::RelationalTableType),
                &type_discriminator(table_name),
            ),
        }
    }

    pub fn column(&self, catalog: &TypeCatalog, column_name: &str) -> String {
        build(
            &self.table,
            catalog.entity_name(EntityKind::DerivedRelationalColumn),
            column_name,
        )
    }

    pub fn column_type(&self, catalog: &TypeCatalog, column_name: &str) -> String {
        build(
            &self.table,
            catalog.entity_name(EntityKind::RelationalColumnType),
            &type_discriminator(column_name),
        )
    }
}
