//! Borrow and return transactions

use chrono::Duration;
use lending_engine::{
    error::{AppError, ConflictKind},
    models::BorrowingStatus,
};
use tokio_test::assert_ok;

use crate::common::engine;

#[tokio::test]
async fn test_borrow_then_return_restores_inventory() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    let record = t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    assert_eq!(record.status, BorrowingStatus::Borrowed);
    assert_eq!(record.due_date - record.borrow_date, Duration::days(14));
    assert_eq!(record.borrow_date, t.clock_now());
    assert!(record.return_date.is_none());
    assert_eq!(t.available(book.id).await, 2);

    let returned = t.services.lending.return_book(book.id, patron.id, "").await.unwrap();
    assert_eq!(returned.id, record.id);
    assert_eq!(returned.status, BorrowingStatus::Returned);
    assert!(returned.return_date.is_some());
    assert_eq!(t.available(book.id).await, 3);
}

#[tokio::test]
async fn test_second_borrow_of_same_book_is_duplicate() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    assert_ok!(t.services.lending.borrow(book.id, patron.id, "").await);
    let err = t.services.lending.borrow(book.id, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::DuplicateLoan)));
    // The failed attempt must not have taken a copy
    assert_eq!(t.available(book.id).await, 2);
}

#[tokio::test]
async fn test_overdue_loan_still_blocks_duplicate() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    t.clock.advance(Duration::days(15));
    assert_eq!(t.services.sweeper.sweep().await.unwrap(), 1);

    let err = t.services.lending.borrow(book.id, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::DuplicateLoan)));
}

#[tokio::test]
async fn test_borrow_again_after_return() {
    let t = engine();
    let book = t.book("1234567890123", 1).await;
    let patron = t.patron("P12345").await;

    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    t.services.lending.return_book(book.id, patron.id, "").await.unwrap();
    let again = t.services.lending.borrow(book.id, patron.id, "second time").await.unwrap();
    assert_eq!(again.notes, "second time");
    assert_eq!(t.available(book.id).await, 0);
}

#[tokio::test]
async fn test_out_of_stock() {
    let t = engine();
    let book = t.book("9876543210987", 1).await;
    let first = t.patron("P1").await;
    let second = t.patron("P2").await;

    t.services.lending.borrow(book.id, first.id, "").await.unwrap();
    let err = t.services.lending.borrow(book.id, second.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::OutOfStock)));
    assert_eq!(t.available(book.id).await, 0);
    assert_eq!(t.services.lending.count_active().await.unwrap(), 1);
}

#[tokio::test]
async fn test_inactive_patron_cannot_borrow() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P67890").await;
    t.services.lending.set_patron_active(patron.id, false).await.unwrap();

    let err = t.services.lending.borrow(book.id, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::PatronInactive)));
    assert_eq!(t.available(book.id).await, 3);
}

#[tokio::test]
async fn test_deactivation_does_not_affect_existing_loan() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    t.services.lending.set_patron_active(patron.id, false).await.unwrap();

    let returned = t.services.lending.return_book(book.id, patron.id, "").await.unwrap();
    assert_eq!(returned.status, BorrowingStatus::Returned);
    assert_eq!(t.available(book.id).await, 3);
}

#[tokio::test]
async fn test_missing_book_or_patron() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    let err = t.services.lending.borrow(9999, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = t.services.lending.borrow(book.id, 9999, "").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = t.services.lending.return_book(book.id, 9999, "").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_soft_deleted_book_cannot_be_borrowed_but_can_be_returned() {
    let t = engine();
    let book = t.book("1234567890123", 2).await;
    let patron = t.patron("P12345").await;
    let other = t.patron("P2").await;

    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    assert!(t.store.soft_delete_book(book.id, t.clock_now()).await);

    let err = t.services.lending.borrow(book.id, other.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let returned = t.services.lending.return_book(book.id, patron.id, "").await.unwrap();
    assert_eq!(returned.status, BorrowingStatus::Returned);
}

#[tokio::test]
async fn test_return_without_loan() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    let err = t.services.lending.return_book(book.id, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::NoActiveLoan)));

    t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    t.services.lending.return_book(book.id, patron.id, "").await.unwrap();
    let err = t.services.lending.return_book(book.id, patron.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ConflictKind::NoActiveLoan)));
    assert_eq!(t.available(book.id).await, 3);
}

#[tokio::test]
async fn test_return_appends_notes() {
    let t = engine();
    let book = t.book("1234567890123", 3).await;
    let patron = t.patron("P12345").await;

    t.services.lending.borrow(book.id, patron.id, "Handle with care").await.unwrap();
    let returned = t.services.lending.return_book(book.id, patron.id, "Returned in good condition").await.unwrap();
    assert_eq!(returned.notes, "Handle with care\nReturn notes: Returned in good condition");

    let stored = t.services.lending.get_record(returned.id).await.unwrap();
    assert_eq!(stored.record.notes, returned.notes);
    assert!(!stored.is_overdue);
}

#[tokio::test]
async fn test_return_of_overdue_loan() {
    let t = engine();
    let book = t.book("1234567890123", 1).await;
    let patron = t.patron("P12345").await;

    let record = t.services.lending.borrow(book.id, patron.id, "").await.unwrap();
    t.clock.advance(Duration::days(20));
    t.services.sweeper.sweep().await.unwrap();
    assert_eq!(
        t.services.lending.get_record(record.id).await.unwrap().record.status,
        BorrowingStatus::Overdue
    );

    let returned = t.services.lending.return_book(book.id, patron.id, "late").await.unwrap();
    assert_eq!(returned.status, BorrowingStatus::Returned);
    assert_eq!(t.available(book.id).await, 1);
}

#[tokio::test]
async fn test_patron_loans_lists_active_only() {
    let t = engine();
    let first = t.book("1111111111111", 2).await;
    let second = t.book("2222222222222", 2).await;
    let patron = t.patron("P12345").await;

    t.services.lending.borrow(first.id, patron.id, "").await.unwrap();
    t.clock.advance(Duration::hours(1));
    t.services.lending.borrow(second.id, patron.id, "").await.unwrap();
    t.services.lending.return_book(first.id, patron.id, "").await.unwrap();

    let loans = t.services.lending.patron_loans(patron.id).await.unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].record.book_id, second.id);
}

#[tokio::test]
async fn test_concurrent_borrows_of_last_copy() {
    let t = engine();
    let book = t.book("1234567890123", 1).await;

    let mut patrons = Vec::new();
    for i in 0..16 {
        patrons.push(t.patron(&format!("P{}", i)).await);
    }

    let book_id = book.id;
    let mut handles = Vec::new();
    for patron in patrons {
        let lending = t.services.lending.clone();
        let patron_id = patron.id;
        handles.push(tokio::spawn(async move { lending.borrow(book_id, patron_id, "").await }));
    }

    let mut successes = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Conflict(ConflictKind::OutOfStock)) => out_of_stock += 1,
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(out_of_stock, 15);
    assert_eq!(t.available(book.id).await, 0);
}

#[tokio::test]
async fn test_concurrent_duplicate_borrows_by_one_patron() {
    let t = engine();
    let book = t.book("1234567890123", 5).await;
    let patron = t.patron("P12345").await;

    let (book_id, patron_id) = (book.id, patron.id);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let lending = t.services.lending.clone();
        handles.push(tokio::spawn(async move { lending.borrow(book_id, patron_id, "").await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Conflict(ConflictKind::DuplicateLoan)) => {}
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(t.available(book.id).await, 4);
    assert_eq!(t.services.lending.patron_loans(patron.id).await.unwrap().len(), 1);
}
