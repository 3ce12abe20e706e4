//! Terminal output

use anyhow::Result;
use apimart_core::{ApiListing, Endpoint, Page, Pagination, Preferences, Pricing, User};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn pricing_label(pricing: &Pricing) -> String {
    match pricing {
        Pricing::Free => "free".to_string(),
        Pricing::Paid { price_per_call } => format!("{price_per_call}/call"),
    }
}

pub fn print_listings(items: &[ApiListing]) {
    if items.is_empty() {
        println!("No APIs found");
        return;
    }
    for api in items {
        println!(
            "{:<38} {:<10} {:<12} {}",
            api.id,
            api.status.as_str(),
            pricing_label(&api.pricing),
            api.name
        );
    }
}

pub fn print_endpoints(items: &[Endpoint]) {
    if items.is_empty() {
        println!("No endpoints found");
        return;
    }
    for endpoint in items {
        println!(
            "{:<38} {:<7} {:<30} {}",
            endpoint.id,
            endpoint.method.as_str(),
            endpoint.path,
            endpoint.name
        );
    }
}

pub fn print_pagination(pagination: &Pagination) {
    if pagination.total_pages > 1 {
        println!(
            "Page {}/{} ({} total)",
            pagination.page, pagination.total_pages, pagination.total
        );
    }
}

pub fn print_page<T>(page: &Page<T>, print_items: fn(&[T])) {
    print_items(&page.items);
    print_pagination(&page.pagination);
}

pub fn print_user(user: &User) {
    println!("{} <{}>", user.display_label(), user.email);
    println!("  id:      {}", user.id);
    println!("  role:    {:?}", user.role);
    println!("  balance: {}", user.balance);
}

pub fn print_preferences(preferences: &Preferences) {
    println!("language: {}", preferences.language);
    println!("theme:    {}", preferences.theme);
}
