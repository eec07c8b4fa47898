pub mod fees;
pub mod students;

pub use fees::{
    CreateFeeRequest, FeeListParams, FeeResponse, FeeSavedResponse, MessageResponse,
    PaymentRecordedResponse, RecordPaymentRequest, UpdateFeeRequest,
};
pub use students::{CreateStudentRequest, StudentListParams, StudentResponse, StudentSavedResponse};
