//! Copy accounting and capacity changes

use lending_engine::{error::AppError, models::NewBook};

use crate::common::engine;

#[tokio::test]
async fn test_registered_book_starts_fully_available() {
    let t = engine();
    let book = t.book("1234567890123", 4).await;
    assert_eq!(book.total_copies, 4);
    assert_eq!(book.available_copies, 4);
    assert!(book.is_available());
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let t = engine();
    let bad_isbn = NewBook {
        title: "Dune".to_string(),
        author: "Frank Herbert".to_string(),
        isbn: "12345".to_string(),
        total_copies: 1,
    };
    assert!(matches!(t.services.ledger.register_book(bad_isbn).await, Err(AppError::Validation(_))));

    let no_copies = NewBook {
        title: "Dune".to_string(),
        author: "Frank Herbert".to_string(),
        isbn: "1234567890123".to_string(),
        total_copies: 0,
    };
    assert!(matches!(t.services.ledger.register_book(no_copies).await, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_duplicate_isbn_is_rejected() {
    let t = engine();
    t.book("1234567890123", 1).await;
    let again = NewBook {
        title: "Other".to_string(),
        author: "Someone".to_string(),
        isbn: "1234567890123".to_string(),
        total_copies: 2,
    };
    assert!(matches!(t.services.ledger.register_book(again).await, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_shrinking_capacity_reclamps_available() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let a = t.patron("P1").await;
    let b = t.patron("P2").await;
    t.services.lending.borrow(book.id, a.id, "").await.unwrap();
    t.services.lending.borrow(book.id, b.id, "").await.unwrap();

    let resized = t.services.ledger.set_total_copies(book.id, 1).await.unwrap();
    assert_eq!(resized.total_copies, 1);
    assert_eq!(resized.available_copies, 0);

    // Releasing past capacity is capped, never an error
    t.services.lending.return_book(book.id, a.id, "").await.unwrap();
    t.services.lending.return_book(book.id, b.id, "").await.unwrap();
    let book = t.services.ledger.get_book(book.id).await.unwrap();
    assert_eq!(book.available_copies, 1);
    assert_eq!(book.total_copies, 1);
}

#[tokio::test]
async fn test_growing_capacity_adds_shelf_copies() {
    let t = engine();
    let book = t.book("1234567890123", 2).await;
    let patron = t.patron("P1").await;
    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();

    let resized = t.services.ledger.set_total_copies(book.id, 5).await.unwrap();
    assert_eq!((resized.total_copies, resized.available_copies), (5, 4));

    assert!(matches!(
        t.services.ledger.set_total_copies(book.id, 0).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        t.services.ledger.set_total_copies(4242, 3).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_counts_stay_in_bounds_through_mixed_traffic() {
    let t = engine();
    let book = t.book("1234567890123", 2).await;
    let mut patrons = Vec::new();
    for i in 0..4 {
        patrons.push(t.patron(&format!("P{}", i)).await);
    }

    for round in 0..3 {
        for patron in &patrons {
            let _ = t.services.lending.borrow(book.id, patron.id, "").await;
            let b = t.services.ledger.get_book(book.id).await.unwrap();
            assert!(b.available_copies >= 0 && b.available_copies <= b.total_copies, "round {}", round);
        }
        for patron in &patrons {
            let _ = t.services.lending.return_book(book.id, patron.id, "").await;
            let b = t.services.ledger.get_book(book.id).await.unwrap();
            assert!(b.available_copies >= 0 && b.available_copies <= b.total_copies, "round {}", round);
        }
    }
    assert_eq!(t.available(book.id).await, 2);
}
