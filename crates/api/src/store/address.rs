//! Upstream-backed address store (read-only)
//!
//! One address book per upstream address type. All writes are refused at the
//! route layer; this store only lists and fetches.

use std::sync::Arc;

use davgate_core::translate;
use davgate_upstream::UpstreamClient;

use crate::ADDRESSBOOK_HOME;
use crate::error::ApiError;
use crate::vcard::address_to_vcard;

/// Address book types served, with display names and descriptions
pub const ADDRESS_BOOKS: [(&str, &str, &str); 4] = [
    ("customer", "Customers", "Customer addresses"),
    ("supplier", "Suppliers", "Supplier addresses"),
    ("employee", "Employees", "Employee addresses"),
    ("other", "Other", "Other addresses"),
];

/// Look up the display name/description of a book by its type segment
pub fn book_info(book_type: &str) -> Option<(&'static str, &'static str)> {
    ADDRESS_BOOKS
        .iter()
        .find(|(segment, _, _)| *segment == book_type)
        .map(|(_, name, description)| (*name, *description))
}

/// An address object as served over WebDAV
#[derive(Debug, Clone)]
pub struct AddressObject {
    pub path: String,
    pub data: String,
    pub etag: String,
}

impl AddressObject {
    fn new(path: String, data: String) -> Self {
        let etag = translate::etag(&data);
        AddressObject { path, data, etag }
    }

    pub fn content_length(&self) -> usize {
        self.data.len()
    }
}

/// Read-only store over the upstream's address books
#[derive(Clone)]
pub struct AddressStore {
    upstream: Arc<UpstreamClient>,
}

impl AddressStore {
    pub fn new(upstream: Arc<UpstreamClient>) -> Self {
        AddressStore { upstream }
    }

    /// List every address object in one book
    pub async fn list_objects(&self, book_type: &str) -> Result<Vec<AddressObject>, ApiError> {
        if book_info(book_type).is_none() {
            return Err(ApiError::NotFound(format!(
                "no address book named {book_type}"
            )));
        }

        let company = self.upstream.company_name().await?.to_string();
        let page = self
            .upstream
            .get_addresses(&company, Some(book_type), None, 0, 1000)
            .await?;

        let mut objects = Vec::new();
        for record in &page.addresses {
            let Some(key) = record.key.as_deref().filter(|k| !k.is_empty()) else {
                continue;
            };
            let vcard = address_to_vcard(record);
            objects.push(AddressObject::new(
                format!("{ADDRESSBOOK_HOME}{book_type}/{key}.vcf"),
                vcard,
            ));
        }
        Ok(objects)
    }

    /// Fetch one address object; 404 when the key belongs to another book
    pub async fn get_object(
        &self,
        book_type: &str,
        address_key: &str,
    ) -> Result<AddressObject, ApiError> {
        if book_info(book_type).is_none() {
            return Err(ApiError::NotFound(format!(
                "no address book named {book_type}"
            )));
        }

        let company = self.upstream.company_name().await?.to_string();
        let record = self.upstream.get_address(&company, address_key).await?;

        if record.address_type.as_deref() != Some(book_type) {
            return Err(ApiError::NotFound(format!(
                "address {address_key} is not in the {book_type} book"
            )));
        }

        let vcard = address_to_vcard(&record);
        Ok(AddressObject::new(
            format!("{ADDRESSBOOK_HOME}{book_type}/{address_key}.vcf"),
            vcard,
        ))
    }
}
