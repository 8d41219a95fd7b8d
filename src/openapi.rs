//! OpenAPI document: component schemas of every request and response body.

use crate::model::{
    Book, BookAvailability, BookDetails, BookStatus, BorrowRecord, BorrowRequest, BorrowStatus,
    NewBook, ProcessOutcome, QueuePosition, Reader, ReaderDetails, ReaderStatus,
    ReaderStatusReport, ReaderType, ReservationRecord, ReservationRequest, ReservationStatus,
};
use crate::response::CountBody;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "library-backend", description = "Library borrowing backend"),
    components(schemas(
        Book,
        BookStatus,
        BookDetails,
        NewBook,
        BookAvailability,
        Reader,
        ReaderType,
        ReaderStatus,
        ReaderDetails,
        ReaderStatusReport,
        BorrowRecord,
        BorrowStatus,
        BorrowRequest,
        ProcessOutcome,
        ReservationRecord,
        ReservationStatus,
        ReservationRequest,
        QueuePosition,
        CountBody,
    ))
)]
pub struct ApiDoc;
