// SPDX-License-Identifier: Apache-2.0

//! Lineage graph builder
//!
//! Materializes the fixed hierarchy above a schema:
//!
//! ```text
//! server -> endpoint <- connection -> connector type
//!                           |
//!                           v
//!                       database -> schema container -> schema type
//! ```
//!
//! View and deployed-schema events share this walk; they differ only in the
//! [`LineageProfile`] they pass in.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use lineage_core::qualified_name::{self, type_discriminator};
use lineage_core::types::keys;
use lineage_core::{EntityKind, ExternalSource, PropertiesBuilder, RelationshipKind};

use super::events::{DeployedDatabaseSchema, EndpointDescriptor, TableSource};
use super::resolver::{EntityRef, EntityResolver};
use crate::error::{ReconcileStep, StepContext, SyncResult};

/// What distinguishes one kind of lineage root from another
#[derive(Debug, Clone)]
pub struct LineageProfile {
    /// Entity kind of the schema container
    pub terminal: EntityKind,
    pub description: String,
    pub owner: String,
    /// Owner of every entity created for this lineage, if not local
    pub external_source: Option<ExternalSource>,
}

impl LineageProfile {
    pub fn information_view() -> Self {
        Self {
            terminal: EntityKind::InformationView,
            description: "This asset is an information view".to_string(),
            owner: String::new(),
            external_source: None,
        }
    }

    pub fn deployed_schema(external_source: Option<ExternalSource>) -> Self {
        Self {
            terminal: EntityKind::DeployedDatabaseSchema,
            description: "This asset is a deployed database schema".to_string(),
            owner: String::new(),
            external_source,
        }
    }
}

/// Normalized input of the builder
#[derive(Debug, Clone, Copy)]
pub struct LineageSource<'a> {
    pub endpoint: &'a EndpointDescriptor,
    pub connection: &'a str,
    pub connector_provider: Option<&'a str>,
    pub database: &'a str,
    pub schema: &'a str,
}

impl<'a> From<&'a TableSource> for LineageSource<'a> {
    fn from(table: &'a TableSource) -> Self {
        let endpoint = &table.database_source.endpoint;
        Self {
            endpoint,
            connection: endpoint.connection_discriminator(),
            connector_provider: endpoint
                .connector_provider_name
                .as_deref()
                .filter(|p| !p.is_empty()),
            database: &table.database_source.name,
            schema: &table.schema_name,
        }
    }
}

impl<'a> From<&'a DeployedDatabaseSchema> for LineageSource<'a> {
    fn from(schema: &'a DeployedDatabaseSchema) -> Self {
        Self {
            endpoint: &schema.connection.endpoint,
            connection: schema.connection.discriminator(),
            connector_provider: schema.connection.connector_provider(),
            database: schema.database_name(),
            schema: &schema.name,
        }
    }
}

/// Every node resolved by one build
#[derive(Debug, Clone, Serialize)]
pub struct LineageHandles {
    pub server: EntityRef,
    pub endpoint: EntityRef,
    pub connection: EntityRef,
    pub connector_type: Option<EntityRef>,
    pub database: EntityRef,
    pub container: EntityRef,
    pub schema_type: EntityRef,
}

pub struct LineageGraphBuilder {
    resolver: Arc<EntityResolver>,
}

impl LineageGraphBuilder {
    pub fn new(resolver: Arc<EntityResolver>) -> Self {
        Self { resolver }
    }

    /// Upserts the hierarchy and its edges
    ///
    /// Stops at the first failing step; nodes resolved before it stay in the
    /// store and are reused by the next run.
    #[instrument(
        skip(self, source, profile),
        fields(
            host = %source.endpoint.host(),
            database = %source.database,
            schema = %source.schema,
            terminal = ?profile.terminal
        )
    )]
    pub async fn build(
        &self,
        source: &LineageSource<'_>,
        profile: &LineageProfile,
    ) -> SyncResult<LineageHandles> {
        let catalog = self.resolver.catalog();
        let owner = profile.external_source.as_ref();
        let endpoint = source.endpoint;
        let host = endpoint.host();

        let server_qn = qualified_name::software_server(catalog, host);
        let server = self
            .resolver
            .upsert(
                EntityKind::SoftwareServer,
                &server_qn,
                PropertiesBuilder::new()
                    .with_string(keys::NAME, server_qn.as_str())
                    .build(),
                owner,
            )
            .await
            .step(ReconcileStep::SoftwareServer)?;

        let endpoint_qn = qualified_name::build(
            "",
            catalog.entity_name(EntityKind::Endpoint),
            &format!("{}{}", endpoint.protocol, endpoint.network_address),
        );
        let mut endpoint_props = PropertiesBuilder::new()
            .with_string(keys::NAME, endpoint_qn.as_str())
            .with_string(keys::NETWORK_ADDRESS, endpoint.network_address.as_str())
            .with_string(keys::PROTOCOL, endpoint.protocol.as_str());
        if let Some(method) = endpoint.encryption_method.as_deref() {
            endpoint_props = endpoint_props.with_string(keys::ENCRYPTION_METHOD, method);
        }
        if let Some(display_name) = endpoint.display_name.as_deref() {
            endpoint_props = endpoint_props.with_string(keys::DISPLAY_NAME, display_name);
        }
        let endpoint_ref = self
            .resolver
            .upsert(EntityKind::Endpoint, &endpoint_qn, endpoint_props.build(), owner)
            .await
            .step(ReconcileStep::Endpoint)?;
        self.link(RelationshipKind::ServerEndpoint, &server, &endpoint_ref)
            .await?;

        let connection_qn = qualified_name::build(
            &endpoint_qn,
            catalog.entity_name(EntityKind::Connection),
            source.connection,
        );
        let connection = self
            .resolver
            .upsert(
                EntityKind::Connection,
                &connection_qn,
                PropertiesBuilder::new()
                    .with_string(keys::DISPLAY_NAME, source.connection)
                    .with_string(
                        keys::DESCRIPTION,
                        format!("Connection to {}", connection_qn),
                    )
                    .build(),
                owner,
            )
            .await
            .step(ReconcileStep::Connection)?;
        self.link(RelationshipKind::ConnectionEndpoint, &connection, &endpoint_ref)
            .await?;

        let connector_type = match source.connector_provider {
            Some(provider) => {
                let connector_qn = qualified_name::build(
                    "",
                    catalog.entity_name(EntityKind::ConnectorType),
                    provider,
                );
                let connector = self
                    .resolver
                    .upsert(
                        EntityKind::ConnectorType,
                        &connector_qn,
                        PropertiesBuilder::new()
                            .with_string(keys::DISPLAY_NAME, provider)
                            .with_string(keys::CONNECTOR_PROVIDER_CLASS_NAME, provider)
                            .build(),
                        owner,
                    )
                    .await
                    .step(ReconcileStep::ConnectorType)?;
                self.link(RelationshipKind::ConnectionConnectorType, &connection, &connector)
                    .await?;
                Some(connector)
            }
            None => {
                debug!("No connector provider reported, skipping connector type");
                None
            }
        };

        let database_qn = qualified_name::database(catalog, host, source.database);
        let database = self
            .resolver
            .upsert(
                EntityKind::Database,
                &database_qn,
                PropertiesBuilder::new()
                    .with_string(keys::NAME, source.database)
                    .build(),
                owner,
            )
            .await
            .step(ReconcileStep::Database)?;
        self.link(RelationshipKind::ConnectionToAsset, &connection, &database)
            .await?;

        let container_qn = qualified_name::build(
            &database_qn,
            catalog.entity_name(profile.terminal),
            source.schema,
        );
        let container = self
            .resolver
            .upsert(
                profile.terminal,
                &container_qn,
                PropertiesBuilder::new()
                    .with_string(keys::NAME, source.schema)
                    .with_string(keys::OWNER, profile.owner.as_str())
                    .with_string(keys::DESCRIPTION, profile.description.as_str())
                    .build(),
                owner,
            )
            .await
            .step(ReconcileStep::SchemaContainer)?;
        self.link(RelationshipKind::DataContentForDataSet, &database, &container)
            .await?;

        let schema_type_name = type_discriminator(source.schema);
        let schema_type_qn = qualified_name::build(
            &database_qn,
            catalog.entity_name(EntityKind::RelationalDbSchemaType),
            &schema_type_name,
        );
        let schema_type = self
            .resolver
            .upsert(
                EntityKind::RelationalDbSchemaType,
                &schema_type_qn,
                schema_type_properties(&schema_type_name),
                owner,
            )
            .await
            .step(ReconcileStep::SchemaType)?;
        self.link(RelationshipKind::AssetSchemaType, &container, &schema_type)
            .await?;

        Ok(LineageHandles {
            server,
            endpoint: endpoint_ref,
            connection,
            connector_type,
            database,
            container,
            schema_type,
        })
    }

    async fn link(
        &self,
        kind: RelationshipKind,
        from: &EntityRef,
        to: &EntityRef,
    ) -> SyncResult<()> {
        self.resolver
            .ensure_relationship(kind, &from.guid, &to.guid)
            .await
            .step(ReconcileStep::Relationship)?;
        Ok(())
    }
}

/// Properties shared by every schema type node
pub(crate) fn schema_type_properties(display_name: &str) -> lineage_core::Properties {
    PropertiesBuilder::new()
        .with_string(keys::DISPLAY_NAME, display_name)
        .with_string(keys::AUTHOR, "")
        .with_string(keys::USAGE, "")
        .with_string(keys::ENCODING_STANDARD, "")
        .build()
}
