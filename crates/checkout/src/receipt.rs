//! Order receipt rendering.

use std::fmt::Write;

use store::Order;

/// A rendered order receipt, ready for a mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub subject: String,
    pub html: String,
}

impl Receipt {
    /// Renders the receipt for a persisted order. Line prices are the prices
    /// paid, not the current catalog prices.
    pub fn for_order(order: &Order) -> Self {
        let mut items = String::new();
        for item in &order.items {
            // Writing to a String cannot fail.
            let _ = write!(
                items,
                "<li>{} x{} - {}</li>",
                escape(&item.meal.name),
                item.quantity,
                item.line_price()
            );
        }

        let html = format!(
            "<h1>Thank you for your order!</h1>\
             <p>Order ID: #{}</p>\
             <p>Delivery date: {}</p>\
             <p>Total: {}</p>\
             <h3>Items:</h3>\
             <ul>{}</ul>\
             <p>We will notify you when your meals are on the way!</p>",
            order.id, order.delivery_date, order.total_price, items
        );

        Self {
            subject: format!("Order Receipt #{} - PrepToPlate", order.id),
            html,
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
