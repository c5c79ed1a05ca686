use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;

use super::{Engine, EngineError};

fn test_ledger(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("farmstead_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}_{}.ledger", Ulid::new()));
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(path: &PathBuf) -> Engine {
    Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap()
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn draft(name: &str, base_price: i64) -> RoomDraft {
    RoomDraft {
        name: name.into(),
        description: "A quiet room by the paddy fields".into(),
        base_price,
        capacity: 2,
        amenities: vec!["wifi".into(), "fan".into()],
        images: vec![],
    }
}

fn season_draft(start: &str, end: &str, multiplier: f64) -> SeasonDraft {
    SeasonDraft {
        label: "Peak".into(),
        start: d(start),
        end: d(end),
        multiplier,
    }
}

fn reserve_req(room_id: Ulid, check_in: &str, check_out: &str) -> ReserveRequest {
    ReserveRequest {
        room_id,
        guest_name: "Asha".into(),
        guest_phone: "+919900112233".into(),
        check_in: d(check_in),
        check_out: d(check_out),
        paid: false,
    }
}

// ── Room catalog ─────────────────────────────────────────

#[tokio::test]
async fn create_list_and_get_rooms() {
    let path = test_ledger("rooms_crud");
    let engine = new_engine(&path);

    let a = Ulid::new();
    let b = Ulid::new();
    engine.create_room(a, draft("Cottage", 3000)).await.unwrap();
    engine.create_room(b, draft("Loft", 4500)).await.unwrap();

    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.len(), 2);

    let info = engine.room_info(a).await.unwrap();
    assert_eq!(info.name, "Cottage");
    assert_eq!(info.base_price, 3000);
    assert_eq!(info.amenities, vec!["wifi", "fan"]);
}

#[tokio::test]
async fn duplicate_room_id_rejected() {
    let path = test_ledger("rooms_dup");
    let engine = new_engine(&path);

    let id = Ulid::new();
    engine.create_room(id, draft("Cottage", 3000)).await.unwrap();
    let err = engine.create_room(id, draft("Other", 1000)).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
}

#[tokio::test]
async fn update_room_changes_fields() {
    let path = test_ledger("rooms_update");
    let engine = new_engine(&path);

    let id = Ulid::new();
    engine.create_room(id, draft("Cottage", 3000)).await.unwrap();
    engine.update_room(id, draft("Renamed", 3500)).await.unwrap();

    let info = engine.room_info(id).await.unwrap();
    assert_eq!(info.name, "Renamed");
    assert_eq!(info.base_price, 3500);
}

#[tokio::test]
async fn update_unknown_room_is_not_found() {
    let path = test_ledger("rooms_update_missing");
    let engine = new_engine(&path);
    let err = engine.update_room(Ulid::new(), draft("X", 100)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn invalid_room_drafts_rejected() {
    let path = test_ledger("rooms_invalid");
    let engine = new_engine(&path);

    let mut bad = draft("", 3000);
    let err = engine.create_room(Ulid::new(), bad.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    bad = draft("Cottage", 0);
    let err = engine.create_room(Ulid::new(), bad.clone()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    bad = draft("Cottage", 3000);
    bad.capacity = 0;
    let err = engine.create_room(Ulid::new(), bad).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

// ── Pricing rule store ───────────────────────────────────

#[tokio::test]
async fn season_crud() {
    let path = test_ledger("seasons_crud");
    let engine = new_engine(&path);

    let id = Ulid::new();
    engine
        .add_season(id, season_draft("2030-12-20", "2031-01-05", 1.5))
        .await
        .unwrap();
    assert_eq!(engine.list_seasons().await.len(), 1);

    engine
        .update_season(id, season_draft("2030-12-15", "2031-01-05", 1.6))
        .await
        .unwrap();
    let seasons = engine.list_seasons().await;
    assert_eq!(seasons[0].start, d("2030-12-15"));
    assert_eq!(seasons[0].multiplier, 1.6);

    engine.remove_season(id).await.unwrap();
    assert!(engine.list_seasons().await.is_empty());

    let err = engine.remove_season(id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn invalid_season_drafts_rejected() {
    let path = test_ledger("seasons_invalid");
    let engine = new_engine(&path);

    let err = engine
        .add_season(Ulid::new(), season_draft("2031-01-05", "2030-12-20", 1.5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", -0.5))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", f64::NAN))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

// ── Reservation workflow ─────────────────────────────────

#[tokio::test]
async fn reserve_happy_path() {
    let path = test_ledger("reserve_ok");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
    engine
        .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", 1.5))
        .await
        .unwrap();

    let booking = engine
        .reserve(reserve_req(room, "2030-12-24", "2030-12-27"))
        .await
        .unwrap();
    assert_eq!(booking.total, 13500);
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.stay.nights(), 3);

    let listed = engine.bookings_for_room(room).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, booking.id);
}

#[tokio::test]
async fn reserve_paid_flag_inserts_as_paid() {
    let path = test_ledger("reserve_paid");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    let mut req = reserve_req(room, "2030-06-10", "2030-06-12");
    req.paid = true;
    let booking = engine.reserve(req).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Paid);
}

#[tokio::test]
async fn reserve_rejects_bad_input() {
    let path = test_ledger("reserve_bad_input");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    // inverted range
    let err = engine
        .reserve(reserve_req(room, "2030-06-13", "2030-06-10"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDateRange { .. }));

    // zero nights
    let err = engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-10"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDateRange { .. }));

    // past check-in
    let err = engine
        .reserve(reserve_req(room, "2020-06-10", "2020-06-12"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PastCheckIn(_)));

    // blank guest name
    let mut req = reserve_req(room, "2030-06-10", "2030-06-12");
    req.guest_name = "   ".into();
    let err = engine.reserve(req).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    // unknown room
    let err = engine
        .reserve(reserve_req(Ulid::new(), "2030-06-10", "2030-06-12"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn overlapping_reserve_is_rejected() {
    let path = test_ledger("reserve_overlap");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();
    let err = engine
        .reserve(reserve_req(room, "2030-06-12", "2030-06-15"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::RoomUnavailable(_) | EngineError::RaceLost(_)
    ));
}

#[tokio::test]
async fn back_to_back_stays_allowed() {
    let path = test_ledger("reserve_adjacent");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();
    // check-in on the previous guest's check-out date
    engine
        .reserve(reserve_req(room, "2030-06-13", "2030-06-15"))
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_booking_frees_the_dates() {
    let path = test_ledger("reserve_after_fail");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    let booking = engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();
    assert!(!engine.check_availability(room, d("2030-06-10"), d("2030-06-13")).await.unwrap());

    engine.set_status(booking.id, BookingStatus::Failed).await.unwrap();
    assert!(engine.check_availability(room, d("2030-06-10"), d("2030-06-13")).await.unwrap());

    engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_reserves_one_winner() {
    let path = test_ledger("reserve_race");
    let engine = Arc::new(new_engine(&path));

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.reserve(reserve_req(room, "2030-06-10", "2030-06-13")).await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(EngineError::RoomUnavailable(_)) | Err(EngineError::RaceLost(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(engine.bookings_for_room(room).await.len(), 1);
}

// ── Status updates ───────────────────────────────────────

#[tokio::test]
async fn set_status_overwrites_in_any_direction() {
    let path = test_ledger("status_any_direction");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
    let booking = engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();

    let b = engine.set_status(booking.id, BookingStatus::Paid).await.unwrap();
    assert_eq!(b.status, BookingStatus::Paid);

    // PAID back to PENDING is allowed — no transition table
    let b = engine.set_status(booking.id, BookingStatus::Pending).await.unwrap();
    assert_eq!(b.status, BookingStatus::Pending);
}

#[tokio::test]
async fn set_status_unknown_booking_is_not_found() {
    let path = test_ledger("status_missing");
    let engine = new_engine(&path);
    let err = engine.set_status(Ulid::new(), BookingStatus::Paid).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn set_status_survives_room_deletion() {
    let path = test_ledger("status_orphan");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
    let booking = engine
        .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
        .await
        .unwrap();

    engine.delete_room(room).await.unwrap();
    assert!(matches!(
        engine.room_info(room).await,
        Err(EngineError::NotFound(_))
    ));

    // The booking is orphaned but still addressable
    let b = engine.set_status(booking.id, BookingStatus::Paid).await.unwrap();
    assert_eq!(b.status, BookingStatus::Paid);

    let listed = engine.bookings_for_room(room).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, BookingStatus::Paid);
}

// ── Availability & quote queries ─────────────────────────

#[tokio::test]
async fn availability_window_reports_merged_ranges() {
    let path = test_ledger("window");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
    engine.reserve(reserve_req(room, "2030-06-10", "2030-06-13")).await.unwrap();
    engine.reserve(reserve_req(room, "2030-06-13", "2030-06-15")).await.unwrap();

    let ranges = engine
        .availability_window(room, d("2030-06-01"), d("2030-07-01"))
        .await
        .unwrap();
    assert_eq!(ranges, vec![Stay::new(d("2030-06-10"), d("2030-06-15"))]);

    let err = engine
        .availability_window(room, d("2030-01-01"), d("2035-01-01"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(_)));
}

#[tokio::test]
async fn quote_room_applies_seasons() {
    let path = test_ledger("quote");
    let engine = new_engine(&path);

    let room = Ulid::new();
    engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
    engine
        .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", 1.5))
        .await
        .unwrap();

    let q = engine
        .quote_room(room, d("2030-12-24"), d("2030-12-27"))
        .await
        .unwrap();
    assert_eq!(q.total, 13500);

    // Quoting past dates is allowed — it's a pure price lookup
    let q = engine.quote_room(room, d("2020-03-10"), d("2020-03-12")).await.unwrap();
    assert_eq!(q.total, 6000);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_ledger("restart");
    let room = Ulid::new();
    let booking_id;
    {
        let engine = new_engine(&path);
        engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
        engine
            .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", 1.5))
            .await
            .unwrap();
        let booking = engine
            .reserve(reserve_req(room, "2030-12-24", "2030-12-27"))
            .await
            .unwrap();
        engine.set_status(booking.id, BookingStatus::Paid).await.unwrap();
        booking_id = booking.id;
    }

    let engine = new_engine(&path);
    let info = engine.room_info(room).await.unwrap();
    assert_eq!(info.name, "Cottage");
    assert_eq!(engine.list_seasons().await.len(), 1);

    let b = engine.get_booking(booking_id).unwrap();
    assert_eq!(b.status, BookingStatus::Paid);
    assert_eq!(b.total, 13500);
    assert!(!engine.check_availability(room, d("2030-12-24"), d("2030-12-27")).await.unwrap());
}

#[tokio::test]
async fn orphaned_bookings_survive_restart_and_compaction() {
    let path = test_ledger("orphan_compact");
    let room = Ulid::new();
    let booking_id;
    {
        let engine = new_engine(&path);
        engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
        let booking = engine
            .reserve(reserve_req(room, "2030-06-10", "2030-06-13"))
            .await
            .unwrap();
        booking_id = booking.id;
        engine.delete_room(room).await.unwrap();
        engine.compact_ledger().await.unwrap();
    }

    let engine = new_engine(&path);
    assert!(engine.get_room(&room).is_none());
    let b = engine.get_booking(booking_id).unwrap();
    assert_eq!(b.room_id, room);

    // Still mutable after compaction + restart
    engine.set_status(booking_id, BookingStatus::Failed).await.unwrap();
    assert_eq!(engine.get_booking(booking_id).unwrap().status, BookingStatus::Failed);
}

#[tokio::test]
async fn compaction_preserves_live_state() {
    let path = test_ledger("compact_live");
    let room = Ulid::new();
    {
        let engine = new_engine(&path);
        engine.create_room(room, draft("Cottage", 3000)).await.unwrap();
        engine
            .add_season(Ulid::new(), season_draft("2030-12-20", "2031-01-05", 1.5))
            .await
            .unwrap();
        let booking = engine
            .reserve(reserve_req(room, "2030-12-24", "2030-12-27"))
            .await
            .unwrap();
        engine.set_status(booking.id, BookingStatus::Paid).await.unwrap();
        engine.compact_ledger().await.unwrap();
        assert_eq!(engine.ledger_appends_since_compact().await, 0);
    }

    let engine = new_engine(&path);
    assert_eq!(engine.list_seasons().await.len(), 1);
    let bookings = engine.bookings_for_room(room).await;
    assert_eq!(bookings.len(), 1);
    // Final status was baked into the rewritten ledger
    assert_eq!(bookings[0].status, BookingStatus::Paid);
    assert!(!engine.check_availability(room, d("2030-12-24"), d("2030-12-27")).await.unwrap());
}
