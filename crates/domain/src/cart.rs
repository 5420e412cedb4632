//! Shopping cart model.
//!
//! A cart belongs to one customer and holds lines from exactly one store.
//! Every mutation validates its input before touching the lines, so a
//! rejected mutation leaves the cart unchanged.

use common::{CustomerId, MenuId, Money, StoreId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by cart mutations. All of them are client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CartError {
    /// Quantity must be positive when adding, non-negative when updating.
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Unit price must not be negative.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    #[error("Menu name must not be blank")]
    BlankMenuName,

    /// The cart already holds items from another store.
    #[error("Cart holds items from store {cart_store}; cannot add items from store {requested}")]
    StoreMismatch {
        cart_store: StoreId,
        requested: StoreId,
    },

    #[error("Cart item not found: {menu_id}")]
    ItemNotFound { menu_id: MenuId },
}

/// A single line in a customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub store_id: StoreId,
}

impl CartItem {
    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Request to put an item into a cart, as received from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCartItem {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub store_id: StoreId,
}

impl AddCartItem {
    /// Validates the request fields in isolation.
    pub fn validate(&self) -> Result<(), CartError> {
        if self.quantity <= 0 || self.quantity > i64::from(u32::MAX) {
            return Err(CartError::InvalidQuantity {
                quantity: self.quantity,
            });
        }
        if self.unit_price.is_negative() {
            return Err(CartError::InvalidPrice {
                price: self.unit_price.amount(),
            });
        }
        if self.menu_name.trim().is_empty() {
            return Err(CartError::BlankMenuName);
        }
        Ok(())
    }
}

/// A customer's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    customer_id: CustomerId,
    items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            items: Vec::new(),
        }
    }

    /// Rebuilds a cart from stored lines.
    pub fn from_items(customer_id: CustomerId, items: Vec<CartItem>) -> Self {
        Self { customer_id, items }
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<CartItem> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the store every line belongs to, if the cart has any lines.
    pub fn store_id(&self) -> Option<StoreId> {
        self.items.first().map(|item| item.store_id)
    }

    pub fn get_item(&self, menu_id: MenuId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.menu_id == menu_id)
    }

    /// Sum of all line totals at the prices captured in the cart.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Adds an item, incrementing the quantity of an existing line for the
    /// same menu or appending a new line.
    pub fn add_item(&mut self, request: AddCartItem) -> Result<(), CartError> {
        request.validate()?;

        if let Some(cart_store) = self.store_id()
            && cart_store != request.store_id
        {
            return Err(CartError::StoreMismatch {
                cart_store,
                requested: request.store_id,
            });
        }

        // validate() bounds quantity to u32
        let quantity = request.quantity as u32;

        match self
            .items
            .iter_mut()
            .find(|item| item.menu_id == request.menu_id)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
            }
            None => self.items.push(CartItem {
                menu_id: request.menu_id,
                menu_name: request.menu_name,
                quantity,
                unit_price: request.unit_price,
                store_id: request.store_id,
            }),
        }
        Ok(())
    }

    /// Sets the quantity of an existing line. Zero removes the line.
    pub fn update_quantity(&mut self, menu_id: MenuId, quantity: i64) -> Result<(), CartError> {
        if quantity < 0 || quantity > i64::from(u32::MAX) {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let position = self
            .items
            .iter()
            .position(|item| item.menu_id == menu_id)
            .ok_or(CartError::ItemNotFound { menu_id })?;

        if quantity == 0 {
            self.items.remove(position);
        } else if let Some(item) = self.items.get_mut(position) {
            item.quantity = quantity as u32;
        }
        Ok(())
    }

    /// Removes the line for `menu_id`. A missing line is an error.
    pub fn remove_item(&mut self, menu_id: MenuId) -> Result<CartItem, CartError> {
        let position = self
            .items
            .iter()
            .position(|item| item.menu_id == menu_id)
            .ok_or(CartError::ItemNotFound { menu_id })?;
        Ok(self.items.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(menu_id: MenuId, store_id: StoreId, quantity: i64, price: i64) -> AddCartItem {
        AddCartItem {
            menu_id,
            menu_name: "Kimchi stew".to_string(),
            quantity,
            unit_price: Money::new(price),
            store_id,
        }
    }

    #[test]
    fn test_add_new_item_appends_line() {
        let mut cart = Cart::new(CustomerId::new());
        let store = StoreId::new();
        cart.add_item(request(MenuId::new(), store, 2, 8000)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.store_id(), Some(store));
        assert_eq!(cart.subtotal(), Money::new(16000));
    }

    #[test]
    fn test_add_existing_item_increments_quantity() {
        let mut cart = Cart::new(CustomerId::new());
        let store = StoreId::new();
        let menu = MenuId::new();
        cart.add_item(request(menu, store, 2, 8000)).unwrap();
        cart.add_item(request(menu, store, 3, 8000)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get_item(menu).unwrap().quantity, 5);
    }

    #[test]
    fn test_store_mismatch_rejected_and_cart_unchanged() {
        let mut cart = Cart::new(CustomerId::new());
        let store = StoreId::new();
        cart.add_item(request(MenuId::new(), store, 1, 7000)).unwrap();
        let before = cart.clone();

        let other = StoreId::new();
        let err = cart
            .add_item(request(MenuId::new(), other, 1, 7000))
            .unwrap_err();

        assert_eq!(
            err,
            CartError::StoreMismatch {
                cart_store: store,
                requested: other
            }
        );
        assert_eq!(cart, before);
    }

    #[test]
    fn test_add_validation() {
        let mut cart = Cart::new(CustomerId::new());
        let store = StoreId::new();

        assert_eq!(
            cart.add_item(request(MenuId::new(), store, 0, 100)),
            Err(CartError::InvalidQuantity { quantity: 0 })
        );
        assert_eq!(
            cart.add_item(request(MenuId::new(), store, 1, -1)),
            Err(CartError::InvalidPrice { price: -1 })
        );

        let mut blank = request(MenuId::new(), store, 1, 100);
        blank.menu_name = "   ".to_string();
        assert_eq!(cart.add_item(blank), Err(CartError::BlankMenuName));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_zero_price_is_allowed() {
        let mut cart = Cart::new(CustomerId::new());
        cart.add_item(request(MenuId::new(), StoreId::new(), 1, 0))
            .unwrap();
        assert_eq!(cart.subtotal(), Money::zero());
    }

    #[test]
    fn test_update_quantity_replaces_or_removes() {
        let mut cart = Cart::new(CustomerId::new());
        let store = StoreId::new();
        let menu = MenuId::new();
        cart.add_item(request(menu, store, 2, 8000)).unwrap();

        cart.update_quantity(menu, 7).unwrap();
        assert_eq!(cart.get_item(menu).unwrap().quantity, 7);

        cart.update_quantity(menu, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_negative_quantity_is_validation_error() {
        let mut cart = Cart::new(CustomerId::new());
        let menu = MenuId::new();
        cart.add_item(request(menu, StoreId::new(), 2, 8000))
            .unwrap();

        assert_eq!(
            cart.update_quantity(menu, -1),
            Err(CartError::InvalidQuantity { quantity: -1 })
        );
        assert_eq!(cart.get_item(menu).unwrap().quantity, 2);
    }

    #[test]
    fn test_update_missing_item_is_not_found() {
        let mut cart = Cart::new(CustomerId::new());
        let menu = MenuId::new();
        assert_eq!(
            cart.update_quantity(menu, 1),
            Err(CartError::ItemNotFound { menu_id: menu })
        );
    }

    #[test]
    fn test_remove_item() {
        let mut cart = Cart::new(CustomerId::new());
        let menu = MenuId::new();
        cart.add_item(request(menu, StoreId::new(), 1, 8000))
            .unwrap();

        let removed = cart.remove_item(menu).unwrap();
        assert_eq!(removed.menu_id, menu);
        assert_eq!(
            cart.remove_item(menu),
            Err(CartError::ItemNotFound { menu_id: menu })
        );
    }
}
