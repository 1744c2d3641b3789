//! Mapping from heterogeneous raw trip records to the canonical [`Trip`].
//!
//! The backing collection has emitted at least three record shapes over its
//! lifetime: fully nested (`route.destination`), flat (`endLocation`), and
//! mixtures of both. Each canonical field resolves its alternates in a fixed
//! priority order, and anything still missing falls back to a documented
//! default, so consumers never see a partially populated record.

use fleetwatch_protocol::geo::{Coordinate, Position};
use fleetwatch_protocol::raw::{RawLocation, RawScalar, RawTripRecord};
use fleetwatch_protocol::trip::{Customer, Driver, Trip, TripRoute, TripStatus, Vehicle};
use fleetwatch_protocol::TripId;

const UNKNOWN: &str = "Unknown";

/// Normalizes one raw record. Returns `None` only when the record carries no
/// id under any known alias; such records cannot be selected or tracked and
/// are skipped by the directory.
pub fn normalize_trip(record: &RawTripRecord) -> Option<Trip> {
    let id = record
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())?;

    let status = record
        .status
        .as_deref()
        .map(TripStatus::parse)
        .unwrap_or(TripStatus::Pending);

    let customer = Customer {
        name: pick_text(
            &[
                record.customer.as_ref().and_then(|c| c.name.as_deref()),
                record.customer_name.as_deref(),
            ],
            UNKNOWN,
        ),
        address: pick_text(
            &[
                record.customer.as_ref().and_then(|c| c.address.as_deref()),
                record.customer_address.as_deref(),
            ],
            "",
        ),
        phone: pick_text(
            &[
                record.customer.as_ref().and_then(|c| c.phone.as_deref()),
                record.customer_phone.as_deref(),
            ],
            "",
        ),
    };

    let vehicle = Vehicle {
        number: pick_text(
            &[
                record.vehicle.as_ref().and_then(|v| v.number.as_deref()),
                record.vehicle_id.as_deref(),
            ],
            UNKNOWN,
        ),
        kind: pick_text(
            &[record.vehicle.as_ref().and_then(|v| v.kind.as_deref())],
            UNKNOWN,
        ),
        capacity: pick_text(
            &[record.vehicle.as_ref().and_then(|v| v.capacity.as_deref())],
            "",
        ),
    };

    let driver = Driver {
        name: pick_text(
            &[
                record.driver.as_ref().and_then(|d| d.name.as_deref()),
                record.driver_name.as_deref(),
            ],
            UNKNOWN,
        ),
        phone: pick_text(
            &[record.driver.as_ref().and_then(|d| d.phone.as_deref())],
            "",
        ),
    };

    let raw_route = record.route.as_ref();
    let route = TripRoute {
        start: pick_text(
            &[
                raw_route.and_then(|r| r.start.as_deref()),
                record.start_location.as_deref(),
            ],
            "",
        ),
        destination: pick_text(
            &[
                raw_route.and_then(|r| r.destination.as_deref()),
                record.end_location.as_deref(),
            ],
            "",
        ),
        distance_km: pick_scalar(&[
            raw_route.and_then(|r| r.distance.as_ref()),
            record.distance.as_ref(),
        ])
        .unwrap_or(0.0),
        duration: pick_text(
            &[
                raw_route.and_then(|r| r.duration.as_deref()),
                record.duration.as_deref(),
            ],
            "",
        ),
        progress: clamp_progress(pick_scalar(&[
            raw_route.and_then(|r| r.progress.as_ref()),
            record.progress.as_ref(),
        ])),
        eta: pick_text(
            &[
                raw_route.and_then(|r| r.eta.as_deref()),
                record.eta.as_deref(),
            ],
            "",
        ),
        current_location: pick_location(&[
            raw_route.and_then(|r| r.current_location.as_ref()),
            record.current_location.as_ref(),
        ]),
    };

    Some(Trip {
        id: TripId::new(id),
        status,
        customer,
        vehicle,
        driver,
        route,
    })
}

/// First non-empty candidate wins; trailing whitespace never survives.
fn pick_text(candidates: &[Option<&str>], default: &str) -> String {
    candidates
        .iter()
        .flatten()
        .map(|text| text.trim())
        .find(|text| !text.is_empty())
        .unwrap_or(default)
        .to_owned()
}

fn pick_scalar(candidates: &[Option<&RawScalar>]) -> Option<f64> {
    candidates
        .iter()
        .flatten()
        .find_map(|scalar| scalar.as_f64())
        .filter(|value| value.is_finite())
}

fn clamp_progress(value: Option<f64>) -> u8 {
    value.map(|p| p.clamp(0.0, 100.0).round() as u8).unwrap_or(0)
}

/// A stored location is carried over only when both components are present
/// and form a valid coordinate; everything else maps to `None` rather than a
/// half-populated position.
fn pick_location(candidates: &[Option<&RawLocation>]) -> Option<Position> {
    candidates.iter().flatten().find_map(|location| {
        let coordinate = Coordinate::new(location.lat?, location.lng?);
        coordinate
            .is_valid()
            .then(|| Position::new(coordinate, location.address.clone()))
    })
}
