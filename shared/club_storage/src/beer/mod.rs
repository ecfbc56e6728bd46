//! Beer storage module for `DynamoDB` operations
//!
//! Beer rows are partitioned by club. Listing goes through a global secondary
//! index on (`club_id`, `created_at`); search and ordering are applied on the
//! client after the index query.

mod error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, from_items, to_item};
use strum::{Display, EnumString};
use tracing::debug;

pub use error::{BeerStorageError, BeerStorageResult};

/// Highest rating a beer can get
pub const MAX_RATING: u8 = 5;

/// Color values offered as input hints. Any other value is accepted.
pub const SUGGESTED_COLORS: [&str; 6] = ["Lys", "Gylden", "Amber", "Kobber", "Mørk", "Sort"];

/// `DynamoDB` row for a tasted beer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beer {
    /// Primary key - unique beer ID (UUID v4)
    pub id: String,
    /// Club the beer belongs to
    pub club_id: String,
    /// Member who added the beer
    pub user_id: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub brewery: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub color: String,
    /// Price as entered by the member
    #[serde(default)]
    pub price: String,
    /// 0 (unrated) to 5
    #[serde(default)]
    pub rating: u8,
    /// Key of the photo blob, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    /// Timestamp of creation
    pub created_at: i64,
}

/// Editable beer fields, already trimmed and validated by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeerFields {
    pub name: String,
    pub brewery: String,
    pub style: String,
    pub color: String,
    pub price: String,
    pub rating: u8,
}

/// Request to create a new beer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBeer {
    /// Club the beer belongs to
    pub club_id: String,
    /// Member who adds the beer
    pub user_id: String,
    /// Field values
    pub fields: BeerFields,
    /// Key of an already uploaded photo blob
    pub photo_path: Option<String>,
}

/// Changes applied to an existing beer
///
/// All fields are overwritten; `photo_path` is only touched when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeerPatch {
    /// New field values
    pub fields: BeerFields,
    /// Key of an already uploaded replacement photo
    pub photo_path: Option<String>,
}

/// `DynamoDB` attribute names for the beer table
#[derive(Debug, Display)]
#[strum(serialize_all = "snake_case")]
pub enum BeerAttribute {
    /// Primary key - unique beer ID
    Id,
    /// Club ID (GSI partition key)
    ClubId,
    /// Member who added the beer
    UserId,
    Name,
    Brewery,
    Style,
    Color,
    Price,
    Rating,
    /// Photo blob key
    PhotoPath,
    /// Creation timestamp (GSI sort key)
    CreatedAt,
}

/// Ordering of a beer listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BeerSort {
    /// Most recently added first
    #[default]
    Newest,
    /// Oldest first
    Oldest,
    /// Alphabetical by name, case-insensitive
    Name,
    /// Highest rating first, newest first among equal ratings
    Rating,
}

/// Filter, search and ordering for a beer listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeerQuery {
    /// Club to list
    pub club_id: String,
    /// Optional free-text search term
    pub search: Option<String>,
    /// Ordering of the result
    pub sort: BeerSort,
}

impl BeerQuery {
    /// Lists every beer of the club, newest first
    #[must_use]
    pub fn club(club_id: impl Into<String>) -> Self {
        Self {
            club_id: club_id.into(),
            search: None,
            sort: BeerSort::default(),
        }
    }

    /// Restricts the listing to beers matching `term`
    #[must_use]
    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Sets the ordering of the listing
    #[must_use]
    pub const fn with_sort(mut self, sort: BeerSort) -> Self {
        self.sort = sort;
        self
    }

    /// Whether `beer` belongs to the club and matches the search term.
    ///
    /// The term is trimmed and compared case-insensitively against name,
    /// brewery, style and color. A blank term matches everything.
    #[must_use]
    pub fn matches(&self, beer: &Beer) -> bool {
        if beer.club_id != self.club_id {
            return false;
        }

        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let needle = term.to_lowercase();

        [&beer.name, &beer.brewery, &beer.style, &beer.color]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    /// Keeps the matching beers and orders them
    #[must_use]
    pub fn apply(&self, beers: Vec<Beer>) -> Vec<Beer> {
        let mut beers: Vec<Beer> = beers.into_iter().filter(|b| self.matches(b)).collect();

        match self.sort {
            BeerSort::Newest => beers.sort_by_key(|b| std::cmp::Reverse(b.created_at)),
            BeerSort::Oldest => beers.sort_by_key(|b| b.created_at),
            BeerSort::Name => beers.sort_by_cached_key(|b| b.name.to_lowercase()),
            BeerSort::Rating => {
                beers.sort_by_key(|b| (std::cmp::Reverse(b.rating), std::cmp::Reverse(b.created_at)));
            }
        }

        beers
    }
}

/// Row storage collaborator for beers
#[async_trait]
pub trait BeerStorage: Send + Sync {
    /// Inserts a new beer with a generated ID and creation timestamp
    async fn insert(&self, beer: NewBeer) -> BeerStorageResult<Beer>;

    /// Overwrites the fields of an existing beer
    ///
    /// Fails with `BeerStorageError::NotFound` if the beer does not exist.
    async fn update(&self, id: &str, patch: BeerPatch) -> BeerStorageResult<Beer>;

    /// Deletes a beer by ID
    async fn delete(&self, id: &str) -> BeerStorageResult<()>;

    /// Gets a single beer by ID
    async fn get(&self, id: &str) -> BeerStorageResult<Option<Beer>>;

    /// Lists the beers matching `query`, in the requested order
    async fn query(&self, query: &BeerQuery) -> BeerStorageResult<Vec<Beer>>;
}

/// Beer storage backed by a `DynamoDB` table
pub struct DynamoBeerStorage {
    dynamodb_client: Arc<DynamoDbClient>,
    table_name: String,
    club_index_name: String,
}

impl DynamoBeerStorage {
    /// Creates a new storage instance
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `table_name` - `DynamoDB` table name for beers
    /// * `club_index_name` - Name of the GSI keyed by (`club_id`, `created_at`)
    #[must_use]
    pub const fn new(
        dynamodb_client: Arc<DynamoDbClient>,
        table_name: String,
        club_index_name: String,
    ) -> Self {
        Self {
            dynamodb_client,
            table_name,
            club_index_name,
        }
    }

    fn id_key(id: &str) -> (String, AttributeValue) {
        (BeerAttribute::Id.to_string(), AttributeValue::S(id.to_string()))
    }
}

#[async_trait]
impl BeerStorage for DynamoBeerStorage {
    async fn insert(&self, beer: NewBeer) -> BeerStorageResult<Beer> {
        let row = Beer {
            id: uuid::Uuid::new_v4().to_string(),
            club_id: beer.club_id,
            user_id: beer.user_id,
            name: beer.fields.name,
            brewery: beer.fields.brewery,
            style: beer.fields.style,
            color: beer.fields.color,
            price: beer.fields.price,
            rating: beer.fields.rating,
            photo_path: beer.photo_path,
            created_at: chrono::Utc::now().timestamp(),
        };

        let item = to_item(&row)?;

        self.dynamodb_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#pk)")
            .expression_attribute_names("#pk", BeerAttribute::Id.to_string())
            .send()
            .await?;

        debug!(beer_id = %row.id, "Inserted beer");
        Ok(row)
    }

    async fn update(&self, id: &str, patch: BeerPatch) -> BeerStorageResult<Beer> {
        let (key_name, key_value) = Self::id_key(id);
        let fields = patch.fields;

        let mut update_expression = String::from(
            "SET #name = :name, #brewery = :brewery, #style = :style, \
             #color = :color, #price = :price, #rating = :rating",
        );

        let mut request = self
            .dynamodb_client
            .update_item()
            .table_name(&self.table_name)
            .key(key_name, key_value)
            .condition_expression("attribute_exists(#pk)")
            .expression_attribute_names("#pk", BeerAttribute::Id.to_string())
            .expression_attribute_names("#name", BeerAttribute::Name.to_string())
            .expression_attribute_values(":name", AttributeValue::S(fields.name))
            .expression_attribute_names("#brewery", BeerAttribute::Brewery.to_string())
            .expression_attribute_values(":brewery", AttributeValue::S(fields.brewery))
            .expression_attribute_names("#style", BeerAttribute::Style.to_string())
            .expression_attribute_values(":style", AttributeValue::S(fields.style))
            .expression_attribute_names("#color", BeerAttribute::Color.to_string())
            .expression_attribute_values(":color", AttributeValue::S(fields.color))
            .expression_attribute_names("#price", BeerAttribute::Price.to_string())
            .expression_attribute_values(":price", AttributeValue::S(fields.price))
            .expression_attribute_names("#rating", BeerAttribute::Rating.to_string())
            .expression_attribute_values(":rating", AttributeValue::N(fields.rating.to_string()))
            .return_values(ReturnValue::AllNew);

        if let Some(photo_path) = patch.photo_path {
            update_expression.push_str(", #photo_path = :photo_path");
            request = request
                .expression_attribute_names("#photo_path", BeerAttribute::PhotoPath.to_string())
                .expression_attribute_values(":photo_path", AttributeValue::S(photo_path));
        }

        let response = request
            .update_expression(update_expression)
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) {
                    BeerStorageError::NotFound(id.to_string())
                } else {
                    err.into()
                }
            })?;

        let attributes = response
            .attributes
            .ok_or_else(|| BeerStorageError::SerializationError("missing attributes".to_string()))?;

        debug!(beer_id = %id, "Updated beer");
        Ok(from_item(attributes)?)
    }

    async fn delete(&self, id: &str) -> BeerStorageResult<()> {
        let (key_name, key_value) = Self::id_key(id);

        self.dynamodb_client
            .delete_item()
            .table_name(&self.table_name)
            .key(key_name, key_value)
            .send()
            .await?;

        debug!(beer_id = %id, "Deleted beer");
        Ok(())
    }

    async fn get(&self, id: &str) -> BeerStorageResult<Option<Beer>> {
        let (key_name, key_value) = Self::id_key(id);

        let response = self
            .dynamodb_client
            .get_item()
            .table_name(&self.table_name)
            .key(key_name, key_value)
            .send()
            .await?;

        response
            .item
            .map(|item| from_item(item).map_err(BeerStorageError::from))
            .transpose()
    }

    async fn query(&self, query: &BeerQuery) -> BeerStorageResult<Vec<Beer>> {
        let mut beers = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let response = self
                .dynamodb_client
                .query()
                .table_name(&self.table_name)
                .index_name(&self.club_index_name)
                .key_condition_expression("#club_id = :club_id")
                .expression_attribute_names("#club_id", BeerAttribute::ClubId.to_string())
                .expression_attribute_values(":club_id", AttributeValue::S(query.club_id.clone()))
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| match err {
                    SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                        BeerStorageError::Unavailable(err.to_string())
                    }
                    other => other.into(),
                })?;

            let items = response.items.unwrap_or_default();
            beers.extend(from_items::<_, Beer>(items)?);

            match response.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!(club_id = %query.club_id, count = beers.len(), "Queried beers");
        Ok(query.apply(beers))
    }
}
